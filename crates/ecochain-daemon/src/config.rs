//! Configuration for ecochaind

use ecochain_attest::GatewayConfig;
use ecochain_distribution::{ExecutorConfig, PlannerConfig};
use ecochain_scoring::ScoringConfig;
use ecochain_types::{AllocationPolicy, BackoffConfig, EpochClock, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Reporting epoch
    #[serde(default)]
    pub epoch: EpochConfig,

    /// Scoring tables and threshold
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Proof gateway retry and timeout
    #[serde(default)]
    pub attestation: GatewayConfig,

    /// Allocation policy, pool and executor tuning
    #[serde(default)]
    pub distribution: DistributionConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Simulated collaborators
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Reporting epoch length in seconds
    #[serde(default = "default_epoch_length")]
    pub length_secs: u64,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            length_secs: default_epoch_length(),
        }
    }
}

impl EpochConfig {
    pub fn clock(&self) -> EpochClock {
        EpochClock::new(self.length_secs)
    }
}

/// Distribution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Allocation policy
    #[serde(default)]
    pub policy: AllocationPolicy,

    /// Reward pool per epoch in minor token units
    #[serde(default = "default_pool_per_epoch")]
    pub pool_per_epoch: i64,

    /// Ledger transfer retry policy
    #[serde(default = "default_distribution_retry")]
    pub retry: RetryPolicy,

    /// Ledger call timeout in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Concurrent ledger calls per plan
    #[serde(default = "default_confirmation_workers")]
    pub confirmation_workers: usize,

    /// Pause between confirmation rounds in milliseconds
    #[serde(default = "default_confirmation_interval_ms")]
    pub confirmation_interval_ms: u64,

    /// Confirmation rounds per plan run
    #[serde(default = "default_max_confirmation_rounds")]
    pub max_confirmation_rounds: u32,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            policy: AllocationPolicy::default(),
            pool_per_epoch: default_pool_per_epoch(),
            retry: default_distribution_retry(),
            call_timeout_ms: default_call_timeout_ms(),
            confirmation_workers: default_confirmation_workers(),
            confirmation_interval_ms: default_confirmation_interval_ms(),
            max_confirmation_rounds: default_max_confirmation_rounds(),
        }
    }
}

impl DistributionConfig {
    pub fn planner(&self) -> PlannerConfig {
        PlannerConfig {
            policy: self.policy,
        }
    }

    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            retry: self.retry.clone(),
            call_timeout_ms: self.call_timeout_ms,
            confirmation_workers: self.confirmation_workers,
            confirmation_interval_ms: self.confirmation_interval_ms,
            max_confirmation_rounds: self.max_confirmation_rounds,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between checks for finished epochs
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// JSON array of raw readings ingested at start-up
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            seed_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Probability of an injected transient verifier fault
    #[serde(default)]
    pub verifier_failure_rate: f64,

    /// Probability of an injected transient ledger fault
    #[serde(default)]
    pub ledger_failure_rate: f64,

    /// Status polls before a simulated transfer is final
    #[serde(default = "default_finality_polls")]
    pub ledger_finality_polls: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            verifier_failure_rate: 0.0,
            ledger_failure_rate: 0.0,
            ledger_finality_polls: default_finality_polls(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_epoch_length() -> u64 {
    86_400
}

fn default_pool_per_epoch() -> i64 {
    1_000_000
}

fn default_distribution_retry() -> RetryPolicy {
    RetryPolicy::new(5, BackoffConfig::default())
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

fn default_confirmation_workers() -> usize {
    8
}

fn default_confirmation_interval_ms() -> u64 {
    1_000
}

fn default_max_confirmation_rounds() -> u32 {
    30
}

fn default_tick_secs() -> u64 {
    60
}

fn default_finality_polls() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `ECOCHAIN_`-prefixed environment variables (`__` between sections,
    /// e.g. `ECOCHAIN_DISTRIBUTION__POOL_PER_EPOCH`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ECOCHAIN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(config.server.enable_cors);
        assert_eq!(config.epoch.length_secs, 86_400);
        assert_eq!(config.scoring.qualify_threshold, 70);
        assert_eq!(config.attestation.retry.max_attempts, 3);
        assert_eq!(config.distribution.retry.max_attempts, 5);
        assert!(config.distribution.retry.backoff.jitter);
        assert_eq!(config.distribution.policy, AllocationPolicy::Proportional);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: DaemonConfig = serde_json::from_str(
            r#"{
                "epoch": { "length_secs": 3600 },
                "distribution": { "policy": "equal_split", "retry": { "max_attempts": 2 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.epoch.clock().length_secs(), 3600);
        assert_eq!(config.distribution.policy, AllocationPolicy::EqualSplit);
        assert_eq!(config.distribution.retry.max_attempts, 2);
        assert_eq!(config.distribution.pool_per_epoch, 1_000_000);
        assert_eq!(config.scheduler.tick_secs, 60);
    }

    #[test]
    fn test_executor_config_mirrors_section() {
        let section = DistributionConfig {
            confirmation_workers: 3,
            ..Default::default()
        };
        let exec = section.executor();
        assert_eq!(exec.confirmation_workers, 3);
        assert_eq!(exec.retry, section.retry);
    }
}
