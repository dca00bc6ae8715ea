// 🌐 Registry Client - data.gov.il datastore lookups
// Two independent read-only sources keyed by company identifier:
//   - companies registry (name, address, status, violator flag, ...)
//   - contractors/licensing registry (one row per licensed activity)
//
// Each call has its own timeout and failure mode; one registry going down
// must never abort the other call or the reconciliation around it.

use crate::config::EngineConfig;
use crate::identifier::CompanyIdentifier;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// RAW REGISTRY RECORD
// ============================================================================

/// One raw row as returned by a registry query.
///
/// An opaque mapping of registry-specific field names to JSON values.
/// Only the normalization/aggregation modules consult field names, through
/// their mapping tables; nothing here is ever persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct RawRegistryRecord {
    fields: HashMap<String, Value>,
}

impl RawRegistryRecord {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        RawRegistryRecord { fields }
    }

    /// Text value for a field: strings are trimmed, numbers are rendered,
    /// empty/null fields come back as None.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// First non-empty text value among several candidate field names
    /// (registries are inconsistent about e.g. phone column naming).
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k))
    }

    /// Numeric value; numeric-looking strings are parsed as well.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer year value (e.g. last annual-report year).
    pub fn year(&self, key: &str) -> Option<i32> {
        self.number(key).map(|n| n as i32)
    }

    /// Whether the field is present at all (even as an empty string).
    /// Needed to distinguish "violator flag present but blank" from
    /// "registry never sent the flag".
    pub fn has(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(v) if !v.is_null())
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, Value)]) -> Self {
        RawRegistryRecord {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }
}

// ============================================================================
// REGISTRY ERRORS
// ============================================================================

/// Failure of a single registry call. Never aborts the other registry;
/// the orchestrator degrades it to "no new data from this source".
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request timed out after {0:?}")]
    Timeout(Duration),

    #[error("registry returned HTTP {0}")]
    Status(u16),

    #[error("registry transport error: {0}")]
    Transport(String),

    #[error("registry payload malformed: {0}")]
    Malformed(String),

    /// The API answered 200 with `success: false`
    #[error("registry rejected the query")]
    Rejected,
}

impl RegistryError {
    /// Transient failures are worth a bounded retry; a malformed payload
    /// or an explicit rejection is not.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Timeout(_) | RegistryError::Transport(_) => true,
            RegistryError::Status(code) => *code >= 500,
            RegistryError::Malformed(_) | RegistryError::Rejected => false,
        }
    }
}

// ============================================================================
// REGISTRY SOURCE TRAIT
// ============================================================================

/// The seam between the orchestrator and the outside world.
///
/// The production implementation is [`DataGovClient`]; tests substitute
/// scripted sources to exercise degradation paths without a network.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Query the companies registry. Zero rows is success, not an error;
    /// newly formed entities often do not appear yet.
    async fn fetch_companies(
        &self,
        id: &CompanyIdentifier,
    ) -> Result<Vec<RawRegistryRecord>, RegistryError>;

    /// Query the license/contractor registry (typically several rows, one
    /// per licensed activity).
    async fn fetch_licenses(
        &self,
        id: &CompanyIdentifier,
    ) -> Result<Vec<RawRegistryRecord>, RegistryError>;
}

// ============================================================================
// CKAN DATASTORE RESPONSE SHAPE
// ============================================================================

#[derive(Debug, Deserialize)]
struct DatastoreEnvelope {
    success: bool,
    #[serde(default)]
    result: Option<DatastoreResult>,
}

#[derive(Debug, Deserialize)]
struct DatastoreResult {
    #[serde(default)]
    records: Vec<HashMap<String, Value>>,
}

// ============================================================================
// DATA.GOV.IL CLIENT
// ============================================================================

/// Production registry source over the CKAN `datastore_search` API.
pub struct DataGovClient {
    http: reqwest::Client,
    cfg: EngineConfig,
}

impl DataGovClient {
    pub fn new(cfg: EngineConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        Ok(DataGovClient { http, cfg })
    }

    /// One datastore query with bounded retries.
    ///
    /// Retries apply to transient failures only; an empty record set is a
    /// legitimate answer and is returned as-is.
    async fn search(
        &self,
        resource_id: &str,
        id: &CompanyIdentifier,
    ) -> Result<Vec<RawRegistryRecord>, RegistryError> {
        let mut attempt = 0;

        loop {
            match self.search_once(resource_id, id).await {
                Ok(records) => return Ok(records),
                Err(err) if err.is_transient() && attempt < self.cfg.retries => {
                    let backoff = self.cfg.retry_base_delay_ms << attempt;
                    let jitter = rand::thread_rng().gen_range(0..=backoff / 2);
                    let delay = Duration::from_millis(backoff + jitter);
                    warn!(
                        resource_id,
                        id = %id,
                        attempt,
                        ?delay,
                        error = %err,
                        "registry call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn search_once(
        &self,
        resource_id: &str,
        id: &CompanyIdentifier,
    ) -> Result<Vec<RawRegistryRecord>, RegistryError> {
        let response = self
            .http
            .get(&self.cfg.base_url)
            .query(&[("resource_id", resource_id), ("q", id.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RegistryError::Timeout(self.cfg.request_timeout())
                } else {
                    RegistryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status(status.as_u16()));
        }

        let envelope: DatastoreEnvelope = response
            .json()
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;

        if !envelope.success {
            return Err(RegistryError::Rejected);
        }

        let records = envelope
            .result
            .map(|r| r.records)
            .unwrap_or_default()
            .into_iter()
            .map(RawRegistryRecord::new)
            .collect::<Vec<_>>();

        debug!(resource_id, id = %id, rows = records.len(), "registry query complete");

        Ok(records)
    }
}

#[async_trait]
impl RegistrySource for DataGovClient {
    async fn fetch_companies(
        &self,
        id: &CompanyIdentifier,
    ) -> Result<Vec<RawRegistryRecord>, RegistryError> {
        let resource = self.cfg.companies_resource.clone();
        self.search(&resource, id).await
    }

    async fn fetch_licenses(
        &self,
        id: &CompanyIdentifier,
    ) -> Result<Vec<RawRegistryRecord>, RegistryError> {
        let resource = self.cfg.licenses_resource.clone();
        self.search(&resource, id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_trims_and_drops_empty() {
        let rec = RawRegistryRecord::from_pairs(&[
            ("שם חברה", json!("  בניה בע\"מ  ")),
            ("אימייל", json!("")),
            ("מספר בית", json!(12)),
        ]);

        assert_eq!(rec.text("שם חברה").as_deref(), Some("בניה בע\"מ"));
        assert_eq!(rec.text("אימייל"), None);
        assert_eq!(rec.text("מספר בית").as_deref(), Some("12"));
        assert_eq!(rec.text("לא קיים"), None);
    }

    #[test]
    fn test_first_text_fallback_chain() {
        let rec = RawRegistryRecord::from_pairs(&[
            ("MISPAR_TEL", json!("")),
            ("TELEFON", json!("035551234")),
        ]);

        assert_eq!(
            rec.first_text(&["MISPAR_TEL", "TELEFON"]).as_deref(),
            Some("035551234")
        );
    }

    #[test]
    fn test_number_parses_strings() {
        let rec = RawRegistryRecord::from_pairs(&[
            ("HEKEF", json!("1500000")),
            ("SIVUG", json!(5)),
        ]);

        assert_eq!(rec.number("HEKEF"), Some(1_500_000.0));
        assert_eq!(rec.number("SIVUG"), Some(5.0));
        assert_eq!(rec.year("SIVUG"), Some(5));
    }

    #[test]
    fn test_envelope_deserialization() {
        let body = json!({
            "success": true,
            "result": {
                "records": [
                    {"שם חברה": "בדיקה", "סטטוס חברה": "פעילה"}
                ]
            }
        });

        let envelope: DatastoreEnvelope = serde_json::from_value(body).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.result.unwrap().records.len(), 1);
    }

    #[test]
    fn test_envelope_failure_has_no_result() {
        let body = json!({"success": false});
        let envelope: DatastoreEnvelope = serde_json::from_value(body).unwrap();
        assert!(!envelope.success);
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_transient_classification() {
        assert!(RegistryError::Timeout(Duration::from_secs(20)).is_transient());
        assert!(RegistryError::Transport("reset".into()).is_transient());
        assert!(RegistryError::Status(503).is_transient());
        assert!(!RegistryError::Status(404).is_transient());
        assert!(!RegistryError::Malformed("truncated".into()).is_transient());
        assert!(!RegistryError::Rejected.is_transient());
    }
}
