//! Run simulated users concurrently against a remote cache and print metrics.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use sketches_ddsketch::DDSketch;
use tokio::time::Instant;
use yansi::Paint;

use crate::http::HttpRemote;
use crate::metrics::{Metrics, TaskMetrics};
use crate::user::SimulatedUser;
use crate::workload::{Task, Workload};

/// How many simulated users run, for how long, and how fast they are started.
#[derive(Clone, Copy, Debug)]
pub struct Schedule {
    users: usize,
    duration: Duration,
    spawn_rate: Option<f64>,
}

impl Schedule {
    /// Runs `users` simulated users for `duration`, all started at once.
    pub fn new(users: usize, duration: Duration) -> Self {
        Self {
            users,
            duration,
            spawn_rate: None,
        }
    }

    /// Starts users gradually at `rate` users per second.
    ///
    /// A rate of zero or below starts all users at once.
    pub fn spawn_rate(mut self, rate: f64) -> Self {
        self.spawn_rate = (rate > 0.0).then_some(rate);
        self
    }

    /// Number of simulated users.
    pub fn users(&self) -> usize {
        self.users
    }

    /// Total duration of the run.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Delay after the start of the run at which `user` is started.
    ///
    /// Returns `None` if the delay does not fit into a [`Duration`], in which case the user is
    /// never started.
    fn start_offset(&self, user: usize) -> Option<Duration> {
        match self.spawn_rate {
            Some(rate) => Duration::try_from_secs_f64(user as f64 / rate).ok(),
            None => Some(Duration::ZERO),
        }
    }
}

/// Runs the workload against the remote according to the schedule.
///
/// Every user warms up the cache and then executes weighted tasks until the schedule's duration
/// has elapsed. Requests still in flight at that point are abandoned. Returns the merged metrics
/// of all users.
pub async fn run(
    remote: HttpRemote,
    workload: Arc<Workload>,
    schedule: Schedule,
) -> Result<Metrics> {
    ensure!(schedule.users > 0, "at least one simulated user is required");
    ensure!(!schedule.duration.is_zero(), "the load test duration must not be zero");

    let start = Instant::now();
    let deadline = start
        .checked_add(schedule.duration)
        .with_context(|| format!("load test duration {:?} is too long", schedule.duration))?;

    let remote = Arc::new(remote);

    tracing::info!(
        remote = remote.remote(),
        users = schedule.users,
        duration = ?schedule.duration,
        seed = workload.seed(),
        "starting load test"
    );

    let tasks: Vec<_> = (0..schedule.users)
        .map(|id| {
            let user = SimulatedUser::new(id, Arc::clone(&workload), Arc::clone(&remote));
            let start_at = schedule
                .start_offset(id)
                .and_then(|offset| start.checked_add(offset))
                .filter(|start_at| *start_at < deadline);
            tokio::spawn(run_user(user, start_at, deadline))
        })
        .collect();

    let mut total = Metrics::default();
    for task in futures::future::join_all(tasks).await {
        let metrics = task.context("simulated user panicked")?;
        total.merge(&metrics);
    }

    tracing::info!(
        requests = total.requests(),
        failures = total.failures(),
        "load test finished"
    );

    Ok(total)
}

async fn run_user(
    mut user: SimulatedUser,
    start_at: Option<Instant>,
    deadline: Instant,
) -> Metrics {
    let Some(start_at) = start_at else {
        tracing::debug!(user = user.id(), "user would start after the deadline, skipping");
        return user.into_metrics();
    };
    tokio::time::sleep_until(start_at).await;

    tracing::trace!(user = user.id(), "user started");
    // The user loops forever; the deadline elapsing is the only way out.
    let _ = tokio::time::timeout_at(deadline, user.run()).await;
    tracing::trace!(user = user.id(), "user stopped");

    user.into_metrics()
}

/// Prints a human readable summary of the metrics collected by [`run`].
pub fn print_report(workload: &Workload, schedule: &Schedule, metrics: &Metrics) {
    let weights = workload.weights();
    println!();
    println!(
        "{} ({} users, {} keys, GET:PUT {}:{})",
        "## Load test".bold(),
        schedule.users.bold(),
        workload.keys().len().bold(),
        weights.get,
        weights.put,
    );

    for task in Task::ALL {
        print_task(task, metrics.task(task), schedule.duration);
    }

    println!();
    println!("{}", "## TOTALS".bold());
    let ops_ps = per_second(metrics.requests(), schedule.duration);
    print!("  {} requests, {:.2} requests/s", metrics.requests().bold(), ops_ps.bold());
    if metrics.failures() > 0 {
        print!(", {}", format!("{} FAILURES", metrics.failures()).bold().red());
    }
    println!();
}

fn print_task(task: Task, metrics: &TaskMetrics, duration: Duration) {
    let label = format!("{task}:");
    if metrics.requests() > 0 {
        print!("{} ({} ops", label.bold().green(), metrics.requests().bold());
        if metrics.failures > 0 {
            print!(", {}", format!("{} FAILURES", metrics.failures).bold().red());
        }
        println!(")");
        print_ops(&metrics.timing, duration);
        println!();
        print_percentiles(&metrics.timing, Duration::from_secs_f64);
    } else {
        println!("{} no requests", label.bold());
    }

    for (message, count) in &metrics.failure_messages {
        println!("  {} {message}", format!("{count}x").red());
    }
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let quantile = |q| sketch.quantile(q).ok().flatten().unwrap_or_default();

    let avg = map(sketch.sum().unwrap_or_default() / ops as f64);
    let p50 = map(quantile(0.5));
    let p90 = map(quantile(0.9));
    let p99 = map(quantile(0.99));
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops_ps = per_second(sketch.count() as u64, duration);
    print!("  {:.2} operations/s", ops_ps.bold());
}

fn per_second(count: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }
    count as f64 / duration.as_secs_f64()
}
