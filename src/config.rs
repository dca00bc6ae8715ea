// ⚙️ Engine Configuration
// Registry endpoints, timeouts and retry policy in one place instead of
// constants scattered through the handlers.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Base URL of the government open-data datastore search API.
pub const DEFAULT_BASE_URL: &str = "https://data.gov.il/api/3/action/datastore_search";

/// Companies registry dataset (רשם החברות).
pub const COMPANIES_RESOURCE_ID: &str = "f004176c-b85f-4542-8901-7b3176f9a054";

/// Contractors/licensing registry dataset (פנקס הקבלנים).
pub const LICENSES_RESOURCE_ID: &str = "4eb61bd6-18cf-4e7c-9f9c-e166dfa0a2d8";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Datastore API base URL
    pub base_url: String,

    /// Resource id of the companies registry dataset
    pub companies_resource: String,

    /// Resource id of the license/contractor registry dataset
    pub licenses_resource: String,

    /// Per-request timeout, seconds. The registries are third-party;
    /// an unbounded wait here would stall the whole reconciliation.
    pub request_timeout_secs: u64,

    /// Extra attempts after the first failed request (transient errors only)
    pub retries: u32,

    /// Base delay for retry backoff, milliseconds (doubled per attempt,
    /// plus uniform jitter)
    pub retry_base_delay_ms: u64,

    /// Pause between records during bulk revalidation, milliseconds
    pub revalidate_delay_ms: u64,

    /// Path of the SQLite store used by the binaries
    pub db_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            companies_resource: COMPANIES_RESOURCE_ID.to_string(),
            licenses_resource: LICENSES_RESOURCE_ID.to_string(),
            request_timeout_secs: 20,
            retries: 2,
            retry_base_delay_ms: 250,
            revalidate_delay_ms: 100,
            db_path: "contractors.db".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides:
    /// `REGISTRY_BASE_URL`, `REGISTRY_TIMEOUT_SECS`, `REGISTRY_RETRIES`,
    /// `CONTRACTOR_DB`.
    pub fn from_env() -> Self {
        let mut cfg = EngineConfig::default();

        if let Ok(url) = env::var("REGISTRY_BASE_URL") {
            cfg.base_url = url;
        }
        if let Some(secs) = env::var("REGISTRY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            cfg.request_timeout_secs = secs;
        }
        if let Some(n) = env::var("REGISTRY_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            cfg.retries = n;
        }
        if let Ok(path) = env::var("CONTRACTOR_DB") {
            cfg.db_path = path;
        }

        cfg
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.retries, 2);
    }
}
