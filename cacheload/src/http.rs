//! Contains a remote implementation using HTTP to interact with the cache under test.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::workload::Request;

/// The result of a single request, as seen by the load generator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The cache answered with `200 OK`.
    Success,
    /// Any other status, or no response at all. Carries a description of what happened.
    Failure(String),
}

impl Outcome {
    /// Classifies a response purely by its status code.
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::OK {
            Outcome::Success
        } else {
            Outcome::Failure(format!("Status code: {}", status.as_u16()))
        }
    }

    /// Classifies a request that did not yield a response.
    pub fn from_error(error: &reqwest::Error) -> Self {
        Outcome::Failure(format!("Request error: {error}"))
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failure(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    key: &'a str,
    value: &'a str,
}

/// A remote implementation using HTTP to interact with the cache.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    /// Base URL of the cache, without a trailing slash.
    remote: String,
    /// The pooled HTTP client shared by all simulated users.
    client: Client,
}

impl HttpRemote {
    /// Creates a new `HttpRemote` instance with the given remote URL and a default client.
    pub fn new(remote: impl Into<String>) -> Self {
        Self::with_client(remote, Client::new())
    }

    /// Creates a new `HttpRemote` whose requests time out after `timeout`.
    pub fn with_timeout(remote: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(remote, client))
    }

    /// Creates a new `HttpRemote` using a preconfigured client.
    pub fn with_client(remote: impl Into<String>, client: Client) -> Self {
        let mut remote = remote.into();
        while remote.ends_with('/') {
            remote.pop();
        }
        Self { remote, client }
    }

    /// The base URL requests are sent to.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Sends the request and classifies the response.
    pub async fn send(&self, request: Request<'_>) -> Outcome {
        let result = match request {
            Request::Get { key } => self.get(key).await,
            Request::Put { key, value } => self.put(key, value).await,
        };

        match result {
            Ok(status) => Outcome::from_status(status),
            Err(error) => Outcome::from_error(&error),
        }
    }

    pub(crate) async fn get(&self, key: &str) -> reqwest::Result<StatusCode> {
        let response = self
            .client
            .get(format!("{}/get", self.remote))
            .query(&[("key", key)])
            .send()
            .await?;

        let status = response.status();
        // Drain the body so the connection returns to the pool.
        response.bytes().await?;
        Ok(status)
    }

    pub(crate) async fn put(&self, key: &str, value: &str) -> reqwest::Result<StatusCode> {
        let response = self
            .client
            .post(format!("{}/put", self.remote))
            .json(&PutBody { key, value })
            .send()
            .await?;

        let status = response.status();
        response.bytes().await?;
        Ok(status)
    }
}
