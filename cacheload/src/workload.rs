//! A module for defining a [`Workload`] that can be used to load test a remote key-value cache.

use std::fmt;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;
use thiserror::Error;

use crate::pool::{
    DEFAULT_KEY_POOL_SIZE, DEFAULT_VALUE_LENGTH, KeyPool, VALUE_POOL_SIZE, ValuePool,
};

/// Upper bound of keys written by every simulated user before it enters steady state.
pub const WARMUP_KEY_COUNT: usize = 100;
/// Fraction of steady-state requests that are writes when not configured otherwise.
pub const DEFAULT_PUT_RATIO: f64 = 0.3;
/// Delay between two consecutive tasks of a simulated user when not configured otherwise.
pub const DEFAULT_PACING: Duration = Duration::from_millis(10);

/// Granularity at which a put ratio is turned into integer weights.
const RATIO_RESOLUTION: u32 = 1000;

/// Errors when building a [`Workload`].
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The put ratio does not leave a positive weight for both reads and writes.
    #[error("put ratio must be strictly between 0 and 1 (got {0})")]
    InvalidPutRatio(f64),
    /// The key pool would have no keys to request.
    #[error("key pool must contain at least one key")]
    EmptyKeyPool,
}

/// Relative weights of the two tasks, used for weighted random selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaskWeights {
    /// Weight of the `GET` task.
    pub get: u32,
    /// Weight of the `PUT` task.
    pub put: u32,
}

impl TaskWeights {
    /// Derives the smallest integer weights that express the given write fraction.
    ///
    /// The ratio is rounded to three decimal places, so `0.3` yields `7:3` and `0.25` yields
    /// `3:1`.
    pub fn from_put_ratio(put_ratio: f64) -> Result<Self, WorkloadError> {
        if !(put_ratio > 0.0 && put_ratio < 1.0) {
            return Err(WorkloadError::InvalidPutRatio(put_ratio));
        }

        let put = (put_ratio * f64::from(RATIO_RESOLUTION)).round() as u32;
        let get = RATIO_RESOLUTION.saturating_sub(put);
        if put == 0 || get == 0 {
            return Err(WorkloadError::InvalidPutRatio(put_ratio));
        }

        let divisor = gcd(get, put);
        Ok(Self {
            get: get / divisor,
            put: put / divisor,
        })
    }

    /// The write fraction these weights encode.
    pub fn put_ratio(&self) -> f64 {
        f64::from(self.put) / f64::from(self.get + self.put)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// The kind of request a simulated user performs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Task {
    /// Read a key.
    Get,
    /// Write a key with a value.
    Put,
}

impl Task {
    /// All tasks, in reporting order.
    pub const ALL: [Task; 2] = [Task::Get, Task::Put];

    /// Human readable name of the task.
    pub fn name(self) -> &'static str {
        match self {
            Task::Get => "GET",
            Task::Put => "PUT",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single request to send, borrowing its key and value from the workload pools.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Request<'a> {
    /// `GET /get?key=<key>`
    Get {
        /// The key to read.
        key: &'a str,
    },
    /// `POST /put` with a JSON body of key and value.
    Put {
        /// The key to write.
        key: &'a str,
        /// The value to store under `key`.
        value: &'a str,
    },
}

impl<'a> Request<'a> {
    /// The task this request belongs to.
    pub fn task(&self) -> Task {
        match self {
            Request::Get { .. } => Task::Get,
            Request::Put { .. } => Task::Put,
        }
    }

    /// The key targeted by this request.
    pub fn key(&self) -> &'a str {
        match *self {
            Request::Get { key } | Request::Put { key, .. } => key,
        }
    }
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    seed: u64,
    key_pool_size: usize,
    value_length: usize,
    put_ratio: f64,
    pacing: Duration,
}

impl WorkloadBuilder {
    /// Seed for the value pool and every simulated user's RNG.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of distinct keys to request.
    pub fn key_pool_size(mut self, size: usize) -> Self {
        self.key_pool_size = size;
        self
    }

    /// Length of every generated value in characters.
    pub fn value_length(mut self, length: usize) -> Self {
        self.value_length = length;
        self
    }

    /// The fraction of steady-state requests that are writes.
    pub fn put_ratio(mut self, put_ratio: f64) -> Self {
        self.put_ratio = put_ratio;
        self
    }

    /// Fixed delay after every steady-state task.
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Generates the pools and creates the workload instance.
    pub fn build(self) -> Result<Workload, WorkloadError> {
        if self.key_pool_size == 0 {
            return Err(WorkloadError::EmptyKeyPool);
        }

        let weights = TaskWeights::from_put_ratio(self.put_ratio)?;
        let task_distribution = WeightedIndex::new([weights.get, weights.put])
            .map_err(|_| WorkloadError::InvalidPutRatio(self.put_ratio))?;

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let keys = KeyPool::new(self.key_pool_size);
        let values = ValuePool::generate(VALUE_POOL_SIZE, self.value_length, &mut rng);

        Ok(Workload {
            seed: self.seed,
            keys,
            values,
            weights,
            task_distribution,
            pacing: self.pacing,
        })
    }
}

/// Specification of the traffic every simulated user generates.
///
/// A workload is immutable once built. It is shared by all simulated users, each of which brings
/// its own RNG to draw requests with.
#[derive(Debug)]
pub struct Workload {
    /// The seed all randomness of a run derives from.
    seed: u64,
    /// Keys that requests target.
    keys: KeyPool,
    /// Values that writes send.
    values: ValuePool,
    /// Weights derived from the configured put ratio.
    weights: TaskWeights,
    /// A distribution that picks the index of the next task, `0` for GET and `1` for PUT.
    task_distribution: WeightedIndex<u32>,
    /// Delay after every steady-state task.
    pacing: Duration,
}

impl Workload {
    /// Constructs a new workload builder with default settings and a random seed.
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder {
            seed: rand::random(),
            key_pool_size: DEFAULT_KEY_POOL_SIZE,
            value_length: DEFAULT_VALUE_LENGTH,
            put_ratio: DEFAULT_PUT_RATIO,
            pacing: DEFAULT_PACING,
        }
    }

    /// The seed of this workload.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The key pool.
    pub fn keys(&self) -> &KeyPool {
        &self.keys
    }

    /// The value pool.
    pub fn values(&self) -> &ValuePool {
        &self.values
    }

    /// The derived task weights.
    pub fn weights(&self) -> TaskWeights {
        self.weights
    }

    /// Delay after every steady-state task.
    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Creates the RNG for the simulated user with the given index.
    pub fn user_rng(&self, user: usize) -> SmallRng {
        SmallRng::seed_from_u64(self.seed.wrapping_add(1).wrapping_add(user as u64))
    }

    /// Number of writes each simulated user performs during warm-up.
    pub fn warmup_len(&self) -> usize {
        self.keys.len().min(WARMUP_KEY_COUNT)
    }

    /// Writes for the first keys of the pool, in order, each with a random value.
    pub fn warmup_requests<'a, R: Rng + ?Sized>(
        &'a self,
        rng: &mut R,
    ) -> impl Iterator<Item = Request<'a>> {
        self.keys
            .iter()
            .take(self.warmup_len())
            .map(move |key| Request::Put {
                key,
                value: self.values.choose(rng),
            })
    }

    /// Picks the next task according to the task weights.
    pub fn next_task<R: Rng + ?Sized>(&self, rng: &mut R) -> Task {
        match self.task_distribution.sample(rng) {
            0 => Task::Get,
            _ => Task::Put,
        }
    }

    /// Picks the next task and draws its key, and for writes its value.
    pub fn next_request<R: Rng + ?Sized>(&self, rng: &mut R) -> Request<'_> {
        match self.next_task(rng) {
            Task::Get => Request::Get {
                key: self.keys.choose(rng),
            },
            Task::Put => {
                let key = self.keys.choose(rng);
                let value = self.values.choose(rng);
                Request::Put { key, value }
            }
        }
    }
}
