use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Load sentinel for a backend that is unreachable or reports no usable load.
/// Such a backend sorts behind every backend with a real load figure.
pub const UNKNOWN_LOAD: u64 = 99_999;

/// Schema version written into every persisted `CdnEntry`. Store adapters
/// reject values carrying any other version at load time.
pub const ENTRY_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    ENTRY_SCHEMA_VERSION
}

/// Errors related to backend URL handling
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BackendError {
    /// Error when URL is invalid
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// A normalized, type-safe backend URL.
///
/// Normalization trims surrounding whitespace and strips a trailing slash so
/// that `"http://a/ "` and `"http://a"` map to the same registry key. Only
/// http and https schemes are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CdnUrl {
    url: String,
    host: String,
}

impl CdnUrl {
    /// Normalize and validate a raw URL string.
    pub fn new(raw: &str) -> BackendResult<Self> {
        let trimmed = raw.trim().trim_end_matches('/');

        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(BackendError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {raw}"
            )));
        }

        let parsed = url::Url::parse(trimmed)
            .map_err(|e| BackendError::InvalidUrl(format!("{raw}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| BackendError::InvalidUrl(format!("{raw}: missing host")))?
            .to_string();

        Ok(CdnUrl {
            url: trimmed.to_string(),
            host,
        })
    }

    /// Get the normalized URL as a string reference
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Hostname component of the URL (used for trust derivation)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Consume the wrapper, yielding the normalized URL string
    pub fn into_string(self) -> String {
        self.url
    }
}

impl FromStr for CdnUrl {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CdnUrl::new(s)
    }
}

impl fmt::Display for CdnUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Persisted registry record for one backend CDN node.
///
/// Invariant: `healthy == true` implies `fail_count == 0`. An entry whose
/// consecutive failures reach the eviction threshold is deleted from the
/// registry entirely; absence means "purged", which is distinct from
/// "unhealthy but within tolerance".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdnEntry {
    /// Record schema version, checked by store adapters on load
    #[serde(default = "default_schema_version")]
    pub version: u32,
    /// Last observed aggregate load; `UNKNOWN_LOAD` when unreachable/unknown
    pub load: u64,
    /// Whether the most recent probe succeeded
    pub healthy: bool,
    /// Consecutive failed probes since the last success
    pub fail_count: u32,
    /// Timestamp of the last probe result or of registration
    pub updated_at: DateTime<Utc>,
}

impl CdnEntry {
    /// A freshly registered backend: unknown load, unhealthy until probed.
    pub fn registered(now: DateTime<Utc>) -> Self {
        Self {
            version: ENTRY_SCHEMA_VERSION,
            load: UNKNOWN_LOAD,
            healthy: false,
            fail_count: 0,
            updated_at: now,
        }
    }
}

/// Result of one probe of one backend, as fed into the registry.
///
/// `ok` reflects only whether the probe request itself succeeded; a reachable
/// backend with a malformed status payload still probes `ok` with
/// `load == UNKNOWN_LOAD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Whether the probe request succeeded
    pub ok: bool,
    /// Aggregate load reported by the backend
    pub load: u64,
}

impl ProbeOutcome {
    /// Successful probe with the given aggregate load.
    pub fn success(load: u64) -> Self {
        Self { ok: true, load }
    }

    /// Failed probe (network error, timeout, non-2xx).
    pub fn failure() -> Self {
        Self {
            ok: false,
            load: UNKNOWN_LOAD,
        }
    }
}

/// Sum the `loads` mapping of a backend status document.
///
/// Any of: no `loads` key, `loads` not an object, or a non-numeric value in
/// the mapping yields `UNKNOWN_LOAD` (maximally loaded), never a probe
/// failure.
pub fn aggregate_load(status: &serde_json::Value) -> u64 {
    let Some(loads) = status.get("loads").and_then(|v| v.as_object()) else {
        return UNKNOWN_LOAD;
    };

    let mut total: u64 = 0;
    for value in loads.values() {
        match value.as_u64() {
            Some(n) => total = total.saturating_add(n),
            None => return UNKNOWN_LOAD,
        }
    }
    total
}
