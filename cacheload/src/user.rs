//! A simulated user that warms up the cache and then issues weighted requests until stopped.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::SmallRng;

use crate::http::HttpRemote;
use crate::metrics::Metrics;
use crate::workload::{Request, Workload};

/// One independent client of the cache.
///
/// Every user owns its RNG and its metrics, and shares the immutable [`Workload`] and the
/// [`HttpRemote`] with all other users.
#[derive(Debug)]
pub struct SimulatedUser {
    id: usize,
    workload: Arc<Workload>,
    remote: Arc<HttpRemote>,
    rng: SmallRng,
    metrics: Metrics,
}

impl SimulatedUser {
    /// Creates the user with the given index, deriving its RNG from the workload seed.
    pub fn new(id: usize, workload: Arc<Workload>, remote: Arc<HttpRemote>) -> Self {
        let rng = workload.user_rng(id);
        Self {
            id,
            workload,
            remote,
            rng,
            metrics: Metrics::default(),
        }
    }

    /// The index of this user.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Statistics of all requests this user has completed so far.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Consumes the user, returning its statistics.
    pub fn into_metrics(self) -> Metrics {
        self.metrics
    }

    /// Writes the first keys of the pool, each with a random value.
    pub async fn on_start(&mut self) {
        let workload = Arc::clone(&self.workload);
        let requests: Vec<_> = workload.warmup_requests(&mut self.rng).collect();
        for request in requests {
            self.execute(request).await;
        }
        tracing::debug!(user = self.id, requests = workload.warmup_len(), "warm-up done");
    }

    /// Picks and executes one task, then waits for the pacing interval.
    pub async fn step(&mut self) {
        let workload = Arc::clone(&self.workload);
        let request = workload.next_request(&mut self.rng);
        self.execute(request).await;
        tokio::time::sleep(workload.pacing()).await;
    }

    /// Warms up and then runs steps until the future is dropped.
    pub async fn run(&mut self) {
        self.on_start().await;
        loop {
            self.step().await;
        }
    }

    async fn execute(&mut self, request: Request<'_>) {
        let start = Instant::now();
        let outcome = self.remote.send(request).await;
        let elapsed = start.elapsed();

        if !outcome.is_success() {
            tracing::debug!(
                user = self.id,
                task = %request.task(),
                key = request.key(),
                %outcome,
                "request failed"
            );
        }
        self.metrics.record(request.task(), outcome, elapsed);
    }
}
