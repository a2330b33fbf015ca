//! Request statistics collected by simulated users and merged by the runner.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::http::Outcome;
use crate::workload::Task;

/// Statistics of a single task.
#[derive(Default)]
pub struct TaskMetrics {
    /// Latencies of all requests, failed ones included, in seconds.
    pub timing: DDSketch,
    /// Number of failed requests.
    pub failures: u64,
    /// Failed requests, grouped by their failure message.
    pub failure_messages: BTreeMap<String, u64>,
}

impl TaskMetrics {
    /// Number of requests, successful or not.
    pub fn requests(&self) -> u64 {
        self.timing.count() as u64
    }

    /// Number of successful requests.
    pub fn successes(&self) -> u64 {
        self.requests() - self.failures
    }

    pub(crate) fn merge(&mut self, other: &TaskMetrics) {
        // Sketches built with the default config always merge.
        self.timing.merge(&other.timing).ok();
        self.failures += other.failures;
        for (message, count) in &other.failure_messages {
            *self.failure_messages.entry(message.clone()).or_default() += count;
        }
    }
}

impl fmt::Debug for TaskMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMetrics")
            .field("successes", &self.successes())
            .field("failures", &self.failures)
            .field("failure_messages", &self.failure_messages)
            .finish()
    }
}

/// Statistics of all requests issued by one or more simulated users.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Statistics of reads.
    pub get: TaskMetrics,
    /// Statistics of writes, including warm-up writes.
    pub put: TaskMetrics,
}

impl Metrics {
    /// Records the outcome and latency of one request.
    pub fn record(&mut self, task: Task, outcome: Outcome, elapsed: Duration) {
        let metrics = self.task_mut(task);
        metrics.timing.add(elapsed.as_secs_f64());
        if let Outcome::Failure(message) = outcome {
            metrics.failures += 1;
            *metrics.failure_messages.entry(message).or_default() += 1;
        }
    }

    /// Statistics of the given task.
    pub fn task(&self, task: Task) -> &TaskMetrics {
        match task {
            Task::Get => &self.get,
            Task::Put => &self.put,
        }
    }

    fn task_mut(&mut self, task: Task) -> &mut TaskMetrics {
        match task {
            Task::Get => &mut self.get,
            Task::Put => &mut self.put,
        }
    }

    /// Total number of requests across all tasks.
    pub fn requests(&self) -> u64 {
        self.get.requests() + self.put.requests()
    }

    /// Total number of failed requests across all tasks.
    pub fn failures(&self) -> u64 {
        self.get.failures + self.put.failures
    }

    /// Adds all statistics of `other` to this instance.
    pub fn merge(&mut self, other: &Metrics) {
        self.get.merge(&other.get);
        self.put.merge(&other.put);
    }
}
