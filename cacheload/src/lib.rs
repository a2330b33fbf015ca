//! This is a load generation library which drives a mixed read/write workload against a remote
//! key-value cache over HTTP.
//!
//! A [`Workload`] holds a fixed pool of keys named `key_00000` onwards and a fixed pool of random
//! alphabetic values. Every simulated user first writes the beginning of the key pool to warm up
//! the cache, and then loops forever: it picks `GET` or `PUT` by weighted random choice, draws a
//! key (and for writes a value) uniformly from the pools, sends the request, and waits a fixed
//! pacing interval.
//!
//! A request is successful if and only if the cache answers with `200 OK`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod http;
pub mod loadtest;
pub mod metrics;
pub mod observability;
pub mod pool;
pub mod user;
pub mod workload;

pub use crate::loadtest::{Schedule, run};
pub use crate::workload::Workload;
