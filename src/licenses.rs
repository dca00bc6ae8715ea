// 📋 License Aggregator - collapse per-activity registry rows
// The license registry answers with one row per licensed activity; the
// same (group, classification) pair shows up repeatedly across years.
// Rows are folded into a deduplicated list, first occurrence winning;
// the registry lists the most recent rows first.

use crate::registry::RawRegistryRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// LICENSE REGISTRY FIELD MAP
// ============================================================================

/// Column names of the contractors-registry dataset (Latin transliteration,
/// verbatim from the upstream schema).
mod field {
    pub const CONTRACTOR_NUMBER: &str = "MISPAR_KABLAN";
    pub const EMAIL: &str = "EMAIL";
    pub const PHONE: &str = "MISPAR_TEL";
    pub const PHONE_ALT: &str = "TELEFON";
    pub const GROUP: &str = "KVUTZA";
    pub const BRANCH_DESCRIPTION: &str = "TEUR_ANAF";
    pub const CLASSIFICATION: &str = "SIVUG";
    pub const CLASSIFICATION_DATE: &str = "TARICH_SUG";
    pub const SCALE: &str = "HEKEF";
}

// ============================================================================
// LICENSE ENTRY
// ============================================================================

/// One deduplicated classification/activity sourced from the license
/// registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseEntry {
    /// Branch group (classification type)
    pub classification_type: String,

    /// Classification code within the group (e.g. "ג5")
    pub classification_code: String,

    /// Human-readable branch description
    pub description: Option<String>,

    /// Contractor license number in the source registry
    pub license_code: Option<String>,

    /// Date the classification took effect
    pub effective_date: Option<NaiveDate>,

    /// Licensed scale/volume figure
    pub scale: Option<f64>,
}

impl LicenseEntry {
    /// Uniqueness key for deduplication.
    pub fn key(&self) -> (&str, &str) {
        (&self.classification_type, &self.classification_code)
    }
}

/// Contact details the license registry repeats on every row; taken from
/// the first row only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LicenseProfile {
    pub contractor_number: Option<String>,
    pub email: Option<String>,
    /// Unformatted; phone formatting is the normalizer's concern
    pub phone: Option<String>,
}

// ============================================================================
// LICENSE AGGREGATOR
// ============================================================================

pub struct LicenseAggregator;

impl LicenseAggregator {
    pub fn new() -> Self {
        LicenseAggregator
    }

    /// Fold raw rows into a deduplicated entry list.
    ///
    /// Rows missing either the group or the classification code are
    /// skipped. Duplicate (group, code) pairs keep the first occurrence.
    /// A date that fails to parse drops the date, not the entry.
    /// Aggregation is idempotent: the same rows always produce the same
    /// list.
    pub fn aggregate(&self, rows: &[RawRegistryRecord]) -> Vec<LicenseEntry> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut entries = Vec::new();

        for row in rows {
            let classification_type = match row.text(field::GROUP) {
                Some(t) => t,
                None => continue,
            };
            let classification_code = match row.text(field::CLASSIFICATION) {
                Some(c) => c,
                None => continue,
            };

            let key = (classification_type.clone(), classification_code.clone());
            if !seen.insert(key) {
                continue;
            }

            entries.push(LicenseEntry {
                classification_type,
                classification_code,
                description: row.text(field::BRANCH_DESCRIPTION),
                license_code: row.text(field::CONTRACTOR_NUMBER),
                effective_date: row
                    .text(field::CLASSIFICATION_DATE)
                    .and_then(|d| parse_registry_date(&d)),
                scale: row.number(field::SCALE),
            });
        }

        entries
    }

    /// Contact details from the first row of the result set.
    pub fn profile(&self, rows: &[RawRegistryRecord]) -> LicenseProfile {
        let first = match rows.first() {
            Some(row) => row,
            None => return LicenseProfile::default(),
        };

        LicenseProfile {
            contractor_number: first.text(field::CONTRACTOR_NUMBER),
            email: first.text(field::EMAIL),
            phone: first.first_text(&[field::PHONE, field::PHONE_ALT]),
        }
    }
}

impl Default for LicenseAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry exports dates inconsistently (ISO timestamps, bare dates,
/// and day-first forms). Try each; give up quietly.
fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(group: &str, code: &str, date: &str) -> RawRegistryRecord {
        RawRegistryRecord::from_pairs(&[
            ("KVUTZA", json!(group)),
            ("SIVUG", json!(code)),
            ("TEUR_ANAF", json!("בניה")),
            ("MISPAR_KABLAN", json!("12345")),
            ("TARICH_SUG", json!(date)),
            ("HEKEF", json!("4500000")),
        ])
    }

    #[test]
    fn test_aggregate_builds_entries() {
        let agg = LicenseAggregator::new();
        let rows = vec![row("100", "ג5", "2019-03-01T00:00:00")];

        let entries = agg.aggregate(&rows);

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.key(), ("100", "ג5"));
        assert_eq!(entry.classification_type, "100");
        assert_eq!(entry.classification_code, "ג5");
        assert_eq!(entry.description.as_deref(), Some("בניה"));
        assert_eq!(entry.license_code.as_deref(), Some("12345"));
        assert_eq!(
            entry.effective_date,
            NaiveDate::from_ymd_opt(2019, 3, 1)
        );
        assert_eq!(entry.scale, Some(4_500_000.0));
    }

    #[test]
    fn test_duplicate_key_first_occurrence_wins() {
        let agg = LicenseAggregator::new();
        // Most recent row first; the older duplicate must lose
        let rows = vec![
            row("100", "ג5", "2021-01-01T00:00:00"),
            row("100", "ג5", "2015-01-01T00:00:00"),
            row("200", "ב2", "2018-01-01T00:00:00"),
        ];

        let entries = agg.aggregate(&rows);

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].effective_date,
            NaiveDate::from_ymd_opt(2021, 1, 1)
        );
    }

    #[test]
    fn test_rows_missing_type_or_code_are_skipped() {
        let agg = LicenseAggregator::new();
        let rows = vec![
            RawRegistryRecord::from_pairs(&[("KVUTZA", json!("100"))]),
            RawRegistryRecord::from_pairs(&[("SIVUG", json!("ג5"))]),
            RawRegistryRecord::from_pairs(&[
                ("KVUTZA", json!("")),
                ("SIVUG", json!("ג5")),
            ]),
            row("100", "ג5", "2019-01-01T00:00:00"),
        ];

        let entries = agg.aggregate(&rows);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_bad_date_drops_date_not_entry() {
        let agg = LicenseAggregator::new();
        let rows = vec![row("100", "ג5", "סוף 2019")];

        let entries = agg.aggregate(&rows);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].effective_date, None);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let agg = LicenseAggregator::new();
        let rows = vec![
            row("100", "ג5", "2021-01-01T00:00:00"),
            row("100", "ג5", "2015-01-01T00:00:00"),
            row("200", "ב2", "bad date"),
        ];

        let first = agg.aggregate(&rows);
        let second = agg.aggregate(&rows);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_profile_from_first_row() {
        let agg = LicenseAggregator::new();
        let rows = vec![
            RawRegistryRecord::from_pairs(&[
                ("MISPAR_KABLAN", json!("77001")),
                ("EMAIL", json!("office@kablan.co.il")),
                ("MISPAR_TEL", json!("")),
                ("TELEFON", json!("35551234")),
                ("KVUTZA", json!("100")),
                ("SIVUG", json!("ג5")),
            ]),
            row("200", "ב2", "2018-01-01T00:00:00"),
        ];

        let profile = agg.profile(&rows);

        assert_eq!(profile.contractor_number.as_deref(), Some("77001"));
        assert_eq!(profile.email.as_deref(), Some("office@kablan.co.il"));
        // Falls back through the phone column aliases
        assert_eq!(profile.phone.as_deref(), Some("35551234"));
    }

    #[test]
    fn test_profile_of_empty_set() {
        let agg = LicenseAggregator::new();
        assert_eq!(agg.profile(&[]), LicenseProfile::default());
    }

    #[test]
    fn test_date_format_variants() {
        assert_eq!(
            parse_registry_date("2019-03-01T00:00:00"),
            NaiveDate::from_ymd_opt(2019, 3, 1)
        );
        assert_eq!(
            parse_registry_date("2019-03-01"),
            NaiveDate::from_ymd_opt(2019, 3, 1)
        );
        assert_eq!(
            parse_registry_date("01/03/2019"),
            NaiveDate::from_ymd_opt(2019, 3, 1)
        );
        assert_eq!(parse_registry_date(""), None);
    }
}
