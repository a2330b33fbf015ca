//! This is a load generation binary which drives a mixed read/write workload against a remote
//! key-value cache over HTTP and prints throughput and latency metrics.
//!
//! See the library documentation for how simulated users pick their requests.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use argh::FromArgs;
use cacheload::config::{Config, MAX_SERVER_VALUE_LENGTH};
use cacheload::http::HttpRemote;
use cacheload::loadtest::{self, Schedule};
use cacheload::observability;

/// Load generator for a remote key-value cache
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// build the workload and print it without sending any requests
    #[argh(switch)]
    pub dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    observability::initialize_tracing();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config);

    if config.workload.value_length > MAX_SERVER_VALUE_LENGTH {
        tracing::warn!(
            value_length = config.workload.value_length,
            "values longer than {MAX_SERVER_VALUE_LENGTH} characters are rejected by the cache, every PUT will fail"
        );
    }

    let workload = config
        .workload_builder()
        .build()
        .context("invalid workload configuration")?;
    let weights = workload.weights();
    tracing::info!(
        seed = workload.seed(),
        keys = workload.keys().len(),
        values = workload.values().len(),
        get_weight = weights.get,
        put_weight = weights.put,
        "workload ready"
    );

    let schedule = Schedule::new(config.users, config.duration).spawn_rate(config.spawn_rate);
    if args.dry_run {
        println!(
            "{} users for {:?} against {}, GET:PUT {}:{}, {} keys, {} values, warm-up of {} writes per user",
            schedule.users(),
            schedule.duration(),
            config.remote,
            weights.get,
            weights.put,
            workload.keys().len(),
            workload.values().len(),
            workload.warmup_len(),
        );
        return Ok(());
    }

    let remote = match config.request_timeout {
        Some(timeout) => HttpRemote::with_timeout(&config.remote, timeout)
            .context("failed to create HTTP client")?,
        None => HttpRemote::new(&config.remote),
    };

    let workload = Arc::new(workload);
    let metrics = loadtest::run(remote, Arc::clone(&workload), schedule).await?;
    loadtest::print_report(&workload, &schedule, &metrics);

    Ok(())
}
