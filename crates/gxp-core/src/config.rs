//! Workflow configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! confidence_threshold = 0.6
//! max_in_flight_agents = 4
//! agent_timeout_ms = 30000
//!
//! [retry]
//! max_retries = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest consultation window accepted, one year
pub const MAX_CONSULTATION_TIMEOUT_SECS: u64 = 366 * 86_400;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Retry and backoff settings for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Minimum categorization confidence to continue without consultation
    pub confidence_threshold: f64,
    /// Agent calls in flight across all runs
    pub max_in_flight_agents: usize,
    /// Per-agent timeout
    pub agent_timeout_ms: u64,
    /// Timeout for document, model and knowledge-store calls
    pub collaborator_timeout_ms: u64,
    pub retry: RetryConfig,
    /// Window for a reviewer to answer a consultation
    pub consultation_timeout_secs: u64,
    /// Role required to resume a consultation
    pub consultation_role: String,
    /// Fraction of planned agents that must succeed, rounded up
    pub min_agent_success_ratio: f64,
    /// Knowledge-store matches fetched while planning
    pub knowledge_matches: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            max_in_flight_agents: 4,
            agent_timeout_ms: 30_000,
            collaborator_timeout_ms: 60_000,
            retry: RetryConfig::default(),
            consultation_timeout_secs: 86_400,
            consultation_role: "validation_engineer".to_string(),
            min_agent_success_ratio: 0.6,
            knowledge_matches: 5,
        }
    }
}

impl WorkflowConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject settings that would make the engine unsafe or stuck
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if !(self.min_agent_success_ratio > 0.0 && self.min_agent_success_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "min_agent_success_ratio {} is outside (0, 1]",
                self.min_agent_success_ratio
            )));
        }
        if self.max_in_flight_agents == 0 {
            return Err(ConfigError::Invalid("max_in_flight_agents must be at least 1".into()));
        }
        if self.agent_timeout_ms == 0 || self.collaborator_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.consultation_timeout_secs == 0 {
            return Err(ConfigError::Invalid("consultation_timeout_secs must be non-zero".into()));
        }
        if self.consultation_timeout_secs > MAX_CONSULTATION_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "consultation_timeout_secs {} exceeds {}",
                self.consultation_timeout_secs, MAX_CONSULTATION_TIMEOUT_SECS
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid("retry.base_delay_ms exceeds retry.max_delay_ms".into()));
        }
        if self.consultation_role.trim().is_empty() {
            return Err(ConfigError::Invalid("consultation_role must not be empty".into()));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_in_flight_agents(mut self, max: usize) -> Self {
        self.max_in_flight_agents = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout_ms = duration_ms(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout_ms = duration_ms(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_consultation_timeout(mut self, timeout: Duration) -> Self {
        self.consultation_timeout_secs = timeout.as_secs().max(1);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_min_agent_success_ratio(mut self, ratio: f64) -> Self {
        self.min_agent_success_ratio = ratio;
        self
    }

    #[inline]
    #[must_use]
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn consultation_timeout(&self) -> Duration {
        Duration::from_secs(self.consultation_timeout_secs)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
