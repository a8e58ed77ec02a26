//! Configuration data structures for the director.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! They are intentionally serde-friendly and include defaults so that minimal
//! configs remain concise; every field can also be overridden through
//! `DIRECTOR__`-prefixed environment variables.
use serde::{Deserialize, Serialize};

use crate::core::director::DeliveryMode;

/// Sliding-window rate limiting configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Max requests per client per hash per window; `<= 0` disables limiting
    pub max_requests_per_ip: i64,
    /// Trailing window length in seconds
    pub window_secs: u64,
    /// Interval between janitor sweeps of idle rate-limiter keys
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_ip: 10,
            window_secs: 5 * 3600,
            sweep_interval_secs: 60,
        }
    }
}

/// Health-polling configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between polling cycles
    pub interval_secs: u64,
    /// Per-probe connect/read timeout in seconds
    pub probe_timeout_secs: u64,
    /// Grace period before an unreachable backend is evicted, in seconds
    pub eviction_grace_secs: u64,
    /// Maximum concurrent probes per cycle
    pub concurrency: usize,
    /// Whether this replica runs the poller
    pub leader: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            probe_timeout_secs: 4,
            eviction_grace_secs: 30,
            concurrency: 16,
            leader: true,
        }
    }
}

impl PollerConfig {
    /// Consecutive failures before eviction: `ceil(grace / interval)`, min 1.
    pub fn fail_threshold(&self) -> u32 {
        if self.interval_secs == 0 {
            return 1;
        }
        (self.eviction_grace_secs.div_ceil(self.interval_secs)).max(1) as u32
    }
}

/// Backend selection configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SelectionConfig {
    /// Selection-cache TTL in milliseconds (independent of the poll interval)
    pub cache_ttl_millis: u64,
    /// Load-difference band within which backends tie for selection
    pub tolerance: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_millis: 2_000,
            tolerance: 1,
        }
    }
}

/// Special-hash set configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SpecialSetConfig {
    /// Name of the set in the shared set store
    pub set_name: String,
    /// Seconds between background snapshot refreshes
    pub refresh_interval_secs: u64,
}

impl Default for SpecialSetConfig {
    fn default() -> Self {
        Self {
            set_name: "special_hashes".to_string(),
            refresh_interval_secs: 30,
        }
    }
}

/// Top-level director configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DirectorConfig {
    /// The address to listen on
    pub listen_addr: String,
    /// Administrative key checked against the `X-Admin-Key` header
    pub admin_key: String,
    /// Redirect status code for backend redirects (301 or 302)
    pub redirect_code: u16,
    /// Redirect vs proxy delivery of selected backends
    pub delivery: DeliveryMode,
    /// Absolute URL prefix special hashes and blocked referrers redirect to
    pub override_destination: String,
    /// Backend URLs registered at startup
    pub cdns: Vec<String>,
    /// Referrer domains trusted in addition to registry hostnames
    /// (suffix match: subdomains of a listed domain are trusted too)
    pub referrer_allowlist: Vec<String>,
    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
    /// Health polling settings
    pub poller: PollerConfig,
    /// Backend selection settings
    pub selection: SelectionConfig,
    /// Special-hash set settings
    pub special: SpecialSetConfig,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            admin_key: String::new(),
            redirect_code: 302,
            delivery: DeliveryMode::Redirect,
            override_destination: String::new(),
            cdns: Vec::new(),
            referrer_allowlist: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            poller: PollerConfig::default(),
            selection: SelectionConfig::default(),
            special: SpecialSetConfig::default(),
        }
    }
}
