//! Fixed key and value pools that requests are drawn from.
//!
//! Both pools are generated once before any simulated user starts and are never mutated
//! afterwards, so they can be shared freely across users.

use rand::Rng;
use rand::distr::Alphabetic;

/// Number of keys in the pool when not configured otherwise.
pub const DEFAULT_KEY_POOL_SIZE: usize = 5_000;
/// Length of every generated value when not configured otherwise.
pub const DEFAULT_VALUE_LENGTH: usize = 128;
/// Number of values in the value pool.
pub const VALUE_POOL_SIZE: usize = 100;

/// An ordered sequence of unique keys named `key_00000`, `key_00001`, and so on.
#[derive(Debug, Clone)]
pub struct KeyPool {
    keys: Vec<String>,
}

impl KeyPool {
    /// Generates a pool of `size` keys.
    pub fn new(size: usize) -> Self {
        let keys = (0..size).map(Self::key_name).collect();
        Self { keys }
    }

    /// The name of the key at `index`, zero-padded to five digits.
    pub fn key_name(index: usize) -> String {
        format!("key_{index:05}")
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the pool has no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the key at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Iterates all keys in pool order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Whether the given key is part of the pool.
    pub fn contains(&self, key: &str) -> bool {
        key.strip_prefix("key_")
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(|index| self.get(index))
            .is_some_and(|known| known == key)
    }

    /// Picks a key uniformly at random.
    ///
    /// # Panics
    ///
    /// Panics if the pool is empty. [`Workload`](crate::Workload) never builds an empty pool.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.keys[rng.random_range(0..self.keys.len())]
    }
}

/// A fixed collection of random alphabetic values, independent of any key.
#[derive(Debug, Clone)]
pub struct ValuePool {
    values: Vec<String>,
}

impl ValuePool {
    /// Generates `count` values of exactly `length` ASCII letters each.
    pub fn generate<R: Rng + ?Sized>(count: usize, length: usize, rng: &mut R) -> Self {
        let values = (0..count)
            .map(|_| {
                (&mut *rng)
                    .sample_iter(Alphabetic)
                    .take(length)
                    .map(char::from)
                    .collect()
            })
            .collect();
        Self { values }
    }

    /// Number of values in the pool.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the pool has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates all values.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    /// Whether the given value is part of the pool.
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Picks a value uniformly at random.
    ///
    /// # Panics
    ///
    /// Panics if the pool is empty.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.values[rng.random_range(0..self.values.len())]
    }
}
