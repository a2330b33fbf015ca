//! Configuration for the load generator.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `CL__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration
//! structures, for example `CL__WORKLOAD__PUT_RATIO=0.5`. The same in YAML:
//!
//! ```yaml
//! remote: http://localhost:7171
//! duration: 5m
//! users: 50
//!
//! workload:
//!   put_ratio: 0.5
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::pool::{DEFAULT_KEY_POOL_SIZE, DEFAULT_VALUE_LENGTH};
use crate::workload::{DEFAULT_PACING, DEFAULT_PUT_RATIO, Workload, WorkloadBuilder};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "CL__";

/// Longest value the reference cache accepts. Longer values are rejected with `400`.
pub const MAX_SERVER_VALUE_LENGTH: usize = 256;

/// Shape of the traffic each simulated user generates.
///
/// Used in: [`Config::workload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of distinct keys, named `key_00000` onwards.
    ///
    /// Defaults to `5000`.
    pub key_pool_size: usize,

    /// Character length of each generated value.
    ///
    /// Defaults to `128`.
    pub value_length: usize,

    /// Fraction of steady-state requests that are writes. Task weights are derived from this.
    ///
    /// Defaults to `0.3`, which yields GET:PUT weights of 7:3.
    pub put_ratio: f64,

    /// Fixed wait after every steady-state task of a simulated user.
    ///
    /// Defaults to `10ms`.
    #[serde(with = "humantime_serde")]
    pub pacing: Duration,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            key_pool_size: DEFAULT_KEY_POOL_SIZE,
            value_length: DEFAULT_VALUE_LENGTH,
            put_ratio: DEFAULT_PUT_RATIO,
            pacing: DEFAULT_PACING,
        }
    }
}

/// Main configuration struct for the load generator.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the cache under test.
    ///
    /// Defaults to `http://localhost:7171`.
    pub remote: String,

    /// How long to generate load.
    ///
    /// Defaults to `60s`.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Number of concurrent simulated users.
    ///
    /// Defaults to `10`.
    pub users: usize,

    /// Simulated users started per second. `0` starts all of them at once.
    ///
    /// Defaults to `0`.
    pub spawn_rate: f64,

    /// Seed for all randomness of a run. A random seed is chosen and logged if unset.
    pub seed: Option<u64>,

    /// Timeout for every single request. Requests never time out if unset.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Shape of the generated traffic.
    pub workload: WorkloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: "http://localhost:7171".into(),
            duration: Duration::from_secs(60),
            users: 10,
            spawn_rate: 0.0,
            seed: None,
            request_timeout: None,
            workload: WorkloadConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from defaults, the optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// A workload builder with all configured settings applied.
    pub fn workload_builder(&self) -> WorkloadBuilder {
        let mut builder = Workload::builder()
            .key_pool_size(self.workload.key_pool_size)
            .value_length(self.workload.value_length)
            .put_ratio(self.workload.put_ratio)
            .pacing(self.workload.pacing);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.remote, "http://localhost:7171");
            assert_eq!(config.duration, Duration::from_secs(60));
            assert_eq!(config.users, 10);
            assert_eq!(config.seed, None);
            assert_eq!(config.request_timeout, None);
            assert_eq!(config.workload.key_pool_size, 5000);
            assert_eq!(config.workload.value_length, 128);
            assert_eq!(config.workload.put_ratio, 0.3);
            assert_eq!(config.workload.pacing, Duration::from_millis(10));

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CL__REMOTE", "http://cache:9000");
            jail.set_env("CL__USERS", "64");
            jail.set_env("CL__SEED", "1234");
            jail.set_env("CL__REQUEST_TIMEOUT", "2s");
            jail.set_env("CL__WORKLOAD__PUT_RATIO", "0.5");
            jail.set_env("CL__WORKLOAD__PACING", "0ms");

            let config = Config::load(None).unwrap();

            assert_eq!(config.remote, "http://cache:9000");
            assert_eq!(config.users, 64);
            assert_eq!(config.seed, Some(1234));
            assert_eq!(config.request_timeout, Some(Duration::from_secs(2)));
            assert_eq!(config.workload.put_ratio, 0.5);
            assert_eq!(config.workload.pacing, Duration::ZERO);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            remote: http://localhost:8080
            duration: 5m
            spawn_rate: 2.5
            workload:
                key_pool_size: 5
                value_length: 32
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.remote, "http://localhost:8080");
            assert_eq!(config.duration, Duration::from_secs(300));
            assert_eq!(config.spawn_rate, 2.5);
            assert_eq!(config.workload.key_pool_size, 5);
            assert_eq!(config.workload.value_length, 32);
            // untouched fields keep their defaults
            assert_eq!(config.workload.put_ratio, 0.3);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            users: 3
            workload:
                put_ratio: 0.1
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("CL__WORKLOAD__PUT_RATIO", "0.9");

            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.users, 3);
            // Env should overwrite the yaml config
            assert_eq!(config.workload.put_ratio, 0.9);

            Ok(())
        });
    }

    #[test]
    fn builds_configured_workload() {
        let config = Config {
            seed: Some(7),
            workload: WorkloadConfig {
                key_pool_size: 12,
                value_length: 4,
                put_ratio: 0.25,
                ..Default::default()
            },
            ..Default::default()
        };

        let workload = config.workload_builder().build().unwrap();
        assert_eq!(workload.seed(), 7);
        assert_eq!(workload.keys().len(), 12);
        assert!(workload.values().iter().all(|value| value.len() == 4));
        assert_eq!(workload.weights().put, 1);
        assert_eq!(workload.weights().get, 3);
    }
}
