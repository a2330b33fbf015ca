//! Exposes an in-process key-value cache for use in integration tests.
//!
//! The server speaks the same protocol as the cache under test: `GET /get?key=<key>` and
//! `POST /put` with a JSON body of `key` and `value`. It records every request it receives.
//!
//! ```
//! use cacheload_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/get?key=key_00000");
//!    // use the URL in tests...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// Longest key and value the cache accepts.
const MAX_LENGTH: usize = 256;

/// A request as received by the [`TestServer`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordedRequest {
    /// A read of `key`.
    Get {
        /// The requested key.
        key: String,
    },
    /// A write of `value` to `key`.
    Put {
        /// The written key.
        key: String,
        /// The written value.
        value: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    requests: Vec<RecordedRequest>,
    failure: Option<StatusCode>,
}

type SharedState = Arc<Mutex<Inner>>;

fn lock(state: &SharedState) -> std::sync::MutexGuard<'_, Inner> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Deserialize)]
struct GetParams {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutBody {
    key: String,
    value: String,
}

#[derive(Debug, Default, Serialize)]
struct CacheResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

fn error(status: StatusCode, message: &'static str) -> Response {
    let body = CacheResponse {
        status: "ERROR",
        message: Some(message),
        ..Default::default()
    };
    (status, Json(body)).into_response()
}

async fn get_entry(State(state): State<SharedState>, Query(params): Query<GetParams>) -> Response {
    let Some(key) = params.key.filter(|key| !key.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "Key parameter is required");
    };

    let mut inner = lock(&state);
    inner
        .requests
        .push(RecordedRequest::Get { key: key.clone() });

    if let Some(status) = inner.failure {
        return error(status, "Injected failure");
    }
    if key.len() > MAX_LENGTH {
        return error(
            StatusCode::BAD_REQUEST,
            "Key length must not exceed 256 characters",
        );
    }

    match inner.entries.get(&key) {
        Some(value) => Json(CacheResponse {
            status: "OK",
            value: Some(value.clone()),
            key: Some(key),
            ..Default::default()
        })
        .into_response(),
        // A miss is still answered with 200.
        None => error(StatusCode::OK, "Key not found."),
    }
}

async fn put_entry(State(state): State<SharedState>, Json(body): Json<PutBody>) -> Response {
    let mut inner = lock(&state);
    inner.requests.push(RecordedRequest::Put {
        key: body.key.clone(),
        value: body.value.clone(),
    });

    if let Some(status) = inner.failure {
        return error(status, "Injected failure");
    }
    if body.key.is_empty() || body.key.len() > MAX_LENGTH {
        return error(
            StatusCode::BAD_REQUEST,
            "Key length must be between 1 and 256 characters",
        );
    }
    if body.value.len() > MAX_LENGTH {
        return error(
            StatusCode::BAD_REQUEST,
            "Value length must not exceed 256 characters",
        );
    }

    inner.entries.insert(body.key, body.value);
    Json(CacheResponse {
        status: "OK",
        message: Some("Key inserted/updated successfully."),
        ..Default::default()
    })
    .into_response()
}

/// An in-process cache server for use in integration tests.
///
/// The server keeps all entries in memory and listens on a random available port on localhost.
/// It is shut down when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: SharedState,
}

impl TestServer {
    /// Starts a new server on a random port.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = SharedState::default();
        let app = Router::new()
            .route("/get", get(get_entry))
            .route("/put", post(put_entry))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns the base URL of the server, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.socket.port())
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url(), path)
    }

    /// Answers every subsequent request with the given status code, without touching entries.
    ///
    /// # Panics
    ///
    /// Panics if `status` is not a valid HTTP status code.
    pub fn fail_with(&self, status: u16) {
        let status = StatusCode::from_u16(status).unwrap();
        lock(&self.state).failure = Some(status);
    }

    /// Stops injecting failures.
    pub fn recover(&self) {
        lock(&self.state).failure = None;
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// The value currently stored under `key`.
    pub fn value(&self, key: &str) -> Option<String> {
        lock(&self.state).entries.get(key).cloned()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
