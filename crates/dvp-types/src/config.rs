//! Configuration types for the registry, the settlement worker and the
//! registrar client.
//!
//! Worker-side settings load from `DVP_*` environment variables. Loading goes
//! through a lookup function so tests can supply a map instead of mutating
//! the process environment.

use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Address, DvpError, Result, constants};

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| DvpError::Configuration(format!("{key}={raw:?}: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Identity of one registry deployment.
///
/// `chain_id` and `registry_address` form the attestation domain: an
/// attestation signed for one registry never verifies on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Network identity.
    pub chain_id: u64,
    /// Registry identity.
    pub registry_address: Address,
    /// The single administrative authority over role membership.
    pub admin: Address,
}

impl RegistryConfig {
    /// # Errors
    /// `InvalidInput` if the admin or registry address is zero.
    pub fn new(chain_id: u64, registry_address: Address, admin: Address) -> Result<Self> {
        if admin.is_zero() || registry_address.is_zero() {
            return Err(DvpError::InvalidInput {
                reason: "registry address and admin must be non-zero".to_string(),
            });
        }
        Ok(Self {
            chain_id,
            registry_address,
            admin,
        })
    }
}

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

/// Settlement worker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    /// Backfill never starts below this block (e.g. the registry's deploy block).
    pub floor_block: u64,
    /// Backfill covers at most this many blocks behind the head.
    pub max_lookback: u64,
    /// Live handlers allowed in flight at once.
    pub max_concurrent_handlers: usize,
    /// Rejection reasons are cut to this many characters. Never above
    /// [`constants::MAX_REJECT_REASON_CHARS`], the length the registry stores.
    pub reject_reason_max_chars: usize,
    /// Buffered live events before a slow subscriber lags.
    pub event_channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            floor_block: 0,
            max_lookback: constants::DEFAULT_MAX_LOOKBACK_BLOCKS,
            max_concurrent_handlers: constants::DEFAULT_MAX_CONCURRENT_HANDLERS,
            reject_reason_max_chars: constants::MAX_REJECT_REASON_CHARS,
            event_channel_capacity: constants::DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// First block to replay given the current head.
    #[must_use]
    pub fn backfill_start(&self, head: u64) -> u64 {
        self.floor_block.max(head.saturating_sub(self.max_lookback))
    }

    /// Load from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `DVP_FLOOR_BLOCK` (default: 0)
    /// - `DVP_MAX_LOOKBACK` (default: 50000)
    /// - `DVP_MAX_CONCURRENT_HANDLERS` (default: 8)
    /// - `DVP_REJECT_REASON_MAX_CHARS` (default: 200)
    /// - `DVP_EVENT_CHANNEL_CAPACITY` (default: 1024)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            floor_block: parse_var(&lookup, "DVP_FLOOR_BLOCK")?.unwrap_or(defaults.floor_block),
            max_lookback: parse_var(&lookup, "DVP_MAX_LOOKBACK")?.unwrap_or(defaults.max_lookback),
            max_concurrent_handlers: parse_var(&lookup, "DVP_MAX_CONCURRENT_HANDLERS")?
                .unwrap_or(defaults.max_concurrent_handlers),
            reject_reason_max_chars: parse_var(&lookup, "DVP_REJECT_REASON_MAX_CHARS")?
                .unwrap_or(defaults.reject_reason_max_chars),
            event_channel_capacity: parse_var(&lookup, "DVP_EVENT_CHANNEL_CAPACITY")?
                .unwrap_or(defaults.event_channel_capacity),
        };
        if cfg.max_concurrent_handlers == 0 {
            return Err(DvpError::Configuration(
                "DVP_MAX_CONCURRENT_HANDLERS must be > 0".to_string(),
            ));
        }
        if cfg.reject_reason_max_chars == 0
            || cfg.reject_reason_max_chars > constants::MAX_REJECT_REASON_CHARS
        {
            return Err(DvpError::Configuration(format!(
                "DVP_REJECT_REASON_MAX_CHARS must be in 1..={}",
                constants::MAX_REJECT_REASON_CHARS
            )));
        }
        if cfg.event_channel_capacity == 0 {
            return Err(DvpError::Configuration(
                "DVP_EVENT_CHANNEL_CAPACITY must be > 0".to_string(),
            ));
        }
        Ok(cfg)
    }
}

// ---------------------------------------------------------------------------
// RegistrarConfig
// ---------------------------------------------------------------------------

/// External registrar endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrarConfig {
    /// Base URL; requests go to `{base_url}/register`.
    pub base_url: String,
    /// Bearer token.
    pub api_token: String,
    /// Whole-request timeout. Expiry counts as a registrar failure.
    pub timeout_ms: u64,
}

impl RegistrarConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            timeout_ms: constants::DEFAULT_REGISTRAR_TIMEOUT_MS,
        }
    }

    /// `{base_url}/register`, tolerant of a trailing slash on the base.
    #[must_use]
    pub fn register_url(&self) -> String {
        format!("{}/register", self.base_url.trim_end_matches('/'))
    }

    /// Load from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `DVP_REGISTRAR_URL` (required)
    /// - `DVP_REGISTRAR_TOKEN` (required)
    /// - `DVP_REGISTRAR_TIMEOUT_MS` (default: 10000)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("DVP_REGISTRAR_URL")
            .ok_or_else(|| DvpError::Configuration("DVP_REGISTRAR_URL is not set".to_string()))?;
        let api_token = lookup("DVP_REGISTRAR_TOKEN")
            .ok_or_else(|| DvpError::Configuration("DVP_REGISTRAR_TOKEN is not set".to_string()))?;
        let mut cfg = Self::new(base_url, api_token);
        if let Some(ms) = parse_var(&lookup, "DVP_REGISTRAR_TIMEOUT_MS")? {
            cfg.timeout_ms = ms;
        }
        Ok(cfg)
    }
}

impl fmt::Debug for RegistrarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrarConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}
