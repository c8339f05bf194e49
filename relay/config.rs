//! Relay configuration

use std::time::Duration;

use dropclaim_core::intent::ClaimDomain;
use dropclaim_core::leaf::Identity;

use crate::error::{RelayError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Enough for 2^64 leaves
pub const DEFAULT_MAX_PROOF_LEN: usize = 64;

/// How forwarding to the enforcement point is retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Upper bound on a single attempt
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// No pause between attempts (tests and simulations)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Signing domain intents must be bound to
    pub domain: ClaimDomain,
    pub retry: RetryPolicy,
    /// A submitted claim with no outcome after this long is failed locally
    pub confirmation_timeout: Duration,
    /// Settled history records older than this are pruned
    pub history_retention: Duration,
    /// Longest proof accepted from the proof source
    pub max_proof_len: usize,
}

impl RelayConfig {
    pub fn new(domain: ClaimDomain) -> Self {
        Self {
            domain,
            retry: RetryPolicy::default(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            history_retention: DEFAULT_HISTORY_RETENTION,
            max_proof_len: DEFAULT_MAX_PROOF_LEN,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Load from `DROPCLAIM_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    ///
    /// The four domain variables are required. Numeric settings fall back to
    /// their defaults when absent and fail when present but unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| RelayError::Configuration(format!("{} is not set", key)))
        };

        let name = required("DROPCLAIM_DOMAIN_NAME")?;
        let version = required("DROPCLAIM_DOMAIN_VERSION")?;
        let chain_id = parse_number::<u64>("DROPCLAIM_CHAIN_ID", &required("DROPCLAIM_CHAIN_ID")?)?;
        let contract = required("DROPCLAIM_VERIFYING_CONTRACT")?;
        let verifying_contract = Identity::from_hex(&contract)
            .map_err(|e| RelayError::Configuration(format!("DROPCLAIM_VERIFYING_CONTRACT: {}", e)))?;

        let mut config = Self::new(ClaimDomain::new(name, version, chain_id, verifying_contract));

        if let Some(v) = lookup("DROPCLAIM_MAX_RETRIES") {
            config.retry.max_attempts = parse_number("DROPCLAIM_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("DROPCLAIM_RETRY_DELAY_MS") {
            config.retry.retry_delay = Duration::from_millis(parse_number("DROPCLAIM_RETRY_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("DROPCLAIM_REQUEST_TIMEOUT_MS") {
            config.retry.request_timeout =
                Duration::from_millis(parse_number("DROPCLAIM_REQUEST_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("DROPCLAIM_CONFIRMATION_TIMEOUT_SECS") {
            config.confirmation_timeout =
                Duration::from_secs(parse_number("DROPCLAIM_CONFIRMATION_TIMEOUT_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.domain
            .validate()
            .map_err(|e| RelayError::Configuration(e.to_string()))?;
        if self.retry.max_attempts == 0 {
            return Err(RelayError::Configuration("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RelayError::Configuration(format!("{} is not a valid number: {:?}", key, value)))
}
