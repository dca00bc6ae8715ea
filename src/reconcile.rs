// ⚖️ Reconciliation Engine - one canonical record per identifier
// The state machine tying everything together:
//
//   Validate → CheckPersisted → (fresh: Return)
//            → FetchExternal → Normalize & Aggregate → Merge → Persist
//            → Return
//
// Each registry degrades independently: a failed call contributes "no new
// data" instead of aborting. The only hard failures are an invalid
// identifier and both registries down with nothing persisted to serve.

use crate::error::ReconcileError;
use crate::freshness::{DataCategory, FreshnessCache};
use crate::identifier::CompanyIdentifier;
use crate::licenses::LicenseAggregator;
use crate::normalize::RecordNormalizer;
use crate::registry::{RawRegistryRecord, RegistryError, RegistrySource};
use crate::status::StatusIndicatorEngine;
use crate::store::{ContractorRecord, ContractorStore, Event};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// OPTIONS & OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// User explicitly asked for fresh data: freshness always reports
    /// stale and both registries are queried.
    pub force_refresh: bool,

    /// Overall bound on the external-fetch phase. Expiry degrades exactly
    /// like both registries timing out; nothing is persisted from an
    /// aborted fetch.
    pub deadline: Option<Duration>,
}

impl ReconcileOptions {
    pub fn forced() -> Self {
        ReconcileOptions {
            force_refresh: true,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// No record existed; one was created from registry data
    Created,

    /// Persisted record served without (successful) external refresh
    LoadedExisting,

    /// Persisted record merged with fresh registry data
    Refreshed,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::LoadedExisting => "loadedExisting",
            ReconcileOutcome::Refreshed => "refreshed",
        }
    }
}

/// What a reconciliation hands back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub record: ContractorRecord,
    pub outcome: ReconcileOutcome,
    /// Human-readable annotation callers may surface (already-existed,
    /// degraded fetch, archived record)
    pub notice: Option<String>,
}

/// Result of fetching one registry during this run.
enum CategoryFetch {
    /// Category was fresh; no call was made
    Skipped,
    /// Call succeeded (possibly with zero rows)
    Fetched(Vec<RawRegistryRecord>),
    /// Call failed; degraded to "no new data from this source"
    Unavailable(RegistryError),
}

impl CategoryFetch {
    fn failed(&self) -> bool {
        matches!(self, CategoryFetch::Unavailable(_))
    }
}

// ============================================================================
// RECONCILE ENGINE
// ============================================================================

pub struct ReconcileEngine<S: RegistrySource> {
    store: ContractorStore,
    source: S,
    normalizer: RecordNormalizer,
    aggregator: LicenseAggregator,
    status_engine: StatusIndicatorEngine,
    freshness: FreshnessCache,
}

impl<S: RegistrySource> ReconcileEngine<S> {
    pub fn new(store: ContractorStore, source: S) -> Self {
        ReconcileEngine {
            store,
            source,
            normalizer: RecordNormalizer::new(),
            aggregator: LicenseAggregator::new(),
            status_engine: StatusIndicatorEngine::new(),
            freshness: FreshnessCache::new(),
        }
    }

    pub fn store(&self) -> &ContractorStore {
        &self.store
    }

    /// Reconcile one identifier.
    ///
    /// `Ok(None)` means the identifier is valid but unknown everywhere:
    /// no persisted record, and both registries answered with zero rows.
    /// Nothing is fabricated or persisted in that case.
    pub async fn reconcile(
        &self,
        raw_id: &str,
        opts: &ReconcileOptions,
    ) -> Result<Option<Reconciliation>, ReconcileError> {
        // Validate - terminal failure before any side effect
        let id = CompanyIdentifier::parse(raw_id)?;

        let now = Utc::now();
        let existing = self.store.get_by_identifier(&id)?;

        // CheckPersisted - per-category freshness
        let (status_fresh, licenses_fresh) = match &existing {
            Some(record) => (
                self.freshness.is_fresh(
                    record.last_updated(DataCategory::Status),
                    now,
                    record.has_data(DataCategory::Status),
                    opts.force_refresh,
                ),
                self.freshness.is_fresh(
                    record.last_updated(DataCategory::Licenses),
                    now,
                    record.has_data(DataCategory::Licenses),
                    opts.force_refresh,
                ),
            ),
            None => (false, false),
        };

        if let Some(record) = &existing {
            if status_fresh && licenses_fresh {
                debug!(id = %id, "persisted record is fresh, skipping registry calls");
                return Ok(Some(self.loaded_existing(
                    record.clone(),
                    "record already existed, loaded for editing",
                )));
            }
        }

        // FetchExternal - only the stale categories, concurrently
        let (companies, licenses) = self
            .fetch_external(&id, !status_fresh, !licenses_fresh, opts.deadline)
            .await;

        // Both sources down with nothing persisted: the one hard failure
        if existing.is_none() {
            if let (CategoryFetch::Unavailable(c), CategoryFetch::Unavailable(l)) =
                (&companies, &licenses)
            {
                return Err(ReconcileError::LookupFailed {
                    id: id.to_string(),
                    companies: clone_registry_error(c),
                    licenses: clone_registry_error(l),
                });
            }
        }

        // Normalize & Aggregate → Merge
        let mut record = existing
            .clone()
            .unwrap_or_else(|| ContractorRecord::new(&id));
        let mut refreshed_any = false;

        if let CategoryFetch::Fetched(rows) = &companies {
            self.merge_company_data(&id, &mut record, rows, now.year());
            record.status_last_updated = Some(now);
            refreshed_any = true;
        }

        if let CategoryFetch::Fetched(rows) = &licenses {
            self.merge_license_data(&mut record, rows);
            record.licenses_last_updated = Some(now);
            refreshed_any = true;
        }

        // Nothing new anywhere
        if !refreshed_any {
            return match existing {
                Some(record) => Ok(Some(self.loaded_existing(
                    record,
                    "registries unavailable, serving persisted data",
                ))),
                // Unreachable: no existing record means both categories
                // were attempted, and the both-failed case returned above
                None => Ok(None),
            };
        }

        // A valid identifier nobody knows: don't fabricate a record
        if existing.is_none()
            && !record.has_data(DataCategory::Status)
            && !record.has_data(DataCategory::Licenses)
            && record.name.is_none()
            && record.contractor_number.is_none()
        {
            info!(id = %id, "identifier not found in either registry");
            return Ok(None);
        }

        // Persist - atomic upsert by identifier
        record.updated_at = now;
        let stored = self.store.upsert(&record)?;

        let outcome = if existing.is_some() {
            ReconcileOutcome::Refreshed
        } else {
            ReconcileOutcome::Created
        };

        self.audit(&stored, outcome, &companies, &licenses);

        let mut notices = Vec::new();
        if companies.failed() {
            notices.push("companies registry unavailable, status not refreshed".to_string());
        }
        if licenses.failed() {
            notices.push("license registry unavailable, licenses not refreshed".to_string());
        }
        if !stored.is_active {
            notices.push(archived_notice());
        }

        info!(id = %id, outcome = outcome.as_str(), "reconciliation complete");

        Ok(Some(Reconciliation {
            record: stored,
            outcome,
            notice: join_notices(notices),
        }))
    }

    /// Fetch the requested registries concurrently, each failure isolated,
    /// the whole phase optionally bounded by a deadline.
    async fn fetch_external(
        &self,
        id: &CompanyIdentifier,
        need_status: bool,
        need_licenses: bool,
        deadline: Option<Duration>,
    ) -> (CategoryFetch, CategoryFetch) {
        let companies_fut = async {
            if need_status {
                match self.source.fetch_companies(id).await {
                    Ok(rows) => CategoryFetch::Fetched(rows),
                    Err(err) => {
                        warn!(id = %id, error = %err, "companies registry unavailable");
                        CategoryFetch::Unavailable(err)
                    }
                }
            } else {
                CategoryFetch::Skipped
            }
        };

        let licenses_fut = async {
            if need_licenses {
                match self.source.fetch_licenses(id).await {
                    Ok(rows) => CategoryFetch::Fetched(rows),
                    Err(err) => {
                        warn!(id = %id, error = %err, "license registry unavailable");
                        CategoryFetch::Unavailable(err)
                    }
                }
            } else {
                CategoryFetch::Skipped
            }
        };

        let joined = async { tokio::join!(companies_fut, licenses_fut) };

        match deadline {
            Some(limit) => match tokio::time::timeout(limit, joined).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(id = %id, ?limit, "reconciliation deadline expired during fetch");
                    let expired = || CategoryFetch::Unavailable(RegistryError::Timeout(limit));
                    (
                        if need_status { expired() } else { CategoryFetch::Skipped },
                        if need_licenses { expired() } else { CategoryFetch::Skipped },
                    )
                }
            },
            None => joined.await,
        }
    }

    /// Merge one companies-registry result into the record.
    ///
    /// Field-by-field: fresh values win, absent fresh values never erase
    /// persisted ones. The status block is the category payload and is
    /// replaced wholesale - zero rows mean the registry no longer knows
    /// the company, so the block is cleared (the indicator then reads
    /// Unknown, never a stale Green).
    fn merge_company_data(
        &self,
        id: &CompanyIdentifier,
        record: &mut ContractorRecord,
        rows: &[RawRegistryRecord],
        current_year: i32,
    ) {
        let Some(first) = rows.first() else {
            record.status = Default::default();
            record.status_indicator = self.status_engine.evaluate(
                &record.status,
                record.company_type,
                current_year,
            );
            return;
        };

        let company = self.normalizer.normalize_company(id, first);

        record.name = company.name.or(record.name.take());
        record.name_english = company.name_english.or(record.name_english.take());
        record.city = company.city.or(record.city.take());
        record.address = company.address.or(record.address.take());
        record.phone = company.phone.or(record.phone.take());
        record.email = company.email.or(record.email.take());
        record.website = company.website.or(record.website.take());
        record.company_type = company.company_type.or(record.company_type);
        record.foundation_date = company.foundation_date.or(record.foundation_date);

        record.status = company.status;
        record.status_indicator =
            self.status_engine
                .evaluate(&record.status, record.company_type, current_year);
    }

    /// Merge one license-registry result: the entry list is the category
    /// payload (replaced wholesale), contact details fill gaps.
    fn merge_license_data(&self, record: &mut ContractorRecord, rows: &[RawRegistryRecord]) {
        record.licenses = self.aggregator.aggregate(rows);

        let profile = self.aggregator.profile(rows);
        record.contractor_number = profile
            .contractor_number
            .or(record.contractor_number.take());
        record.email = profile.email.or(record.email.take());
        if let Some(phone) = profile.phone.as_deref().and_then(|p| self.normalizer.format_phone(p))
        {
            record.phone = Some(phone);
        }
        if record.website.is_none() {
            record.website = record
                .email
                .as_deref()
                .and_then(|e| self.normalizer.website_from_email(e));
        }
    }

    fn loaded_existing(&self, record: ContractorRecord, notice: &str) -> Reconciliation {
        let mut notices = vec![notice.to_string()];
        if !record.is_active {
            notices.push(archived_notice());
        }

        Reconciliation {
            record,
            outcome: ReconcileOutcome::LoadedExisting,
            notice: join_notices(notices),
        }
    }

    fn audit(
        &self,
        record: &ContractorRecord,
        outcome: ReconcileOutcome,
        companies: &CategoryFetch,
        licenses: &CategoryFetch,
    ) {
        let event_type = match outcome {
            ReconcileOutcome::Created => "contractor_created",
            _ => "contractor_refreshed",
        };

        let event = Event::new(
            event_type,
            "contractor",
            &record.company_id,
            serde_json::json!({
                "outcome": outcome.as_str(),
                "status_refreshed": matches!(companies, CategoryFetch::Fetched(_)),
                "licenses_refreshed": matches!(licenses, CategoryFetch::Fetched(_)),
                "license_count": record.licenses.len(),
                "status_indicator": record.status_indicator.as_str(),
            }),
            "reconcile_engine",
        );

        // Audit must never fail a reconciliation that already persisted
        if let Err(err) = self.store.record_event(&event) {
            warn!(id = %record.company_id, error = %err, "failed to record audit event");
        }
    }
}

/// The archived special case: surfaced to the caller, never auto-flipped;
/// reactivation is an explicit collaborator save.
fn archived_notice() -> String {
    "record is archived; reactivation requires an explicit save".to_string()
}

fn join_notices(notices: Vec<String>) -> Option<String> {
    if notices.is_empty() {
        None
    } else {
        Some(notices.join("; "))
    }
}

/// RegistryError holds non-Clone transport state; rebuild an equivalent
/// value for the LookupFailed payload.
fn clone_registry_error(err: &RegistryError) -> RegistryError {
    match err {
        RegistryError::Timeout(d) => RegistryError::Timeout(*d),
        RegistryError::Status(code) => RegistryError::Status(*code),
        RegistryError::Transport(msg) => RegistryError::Transport(msg.clone()),
        RegistryError::Malformed(msg) => RegistryError::Malformed(msg.clone()),
        RegistryError::Rejected => RegistryError::Rejected,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::CompanyType;
    use crate::status::StatusIndicator;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const VALID_ID: &str = "515782233";

    // ------------------------------------------------------------------
    // Scripted registry source
    // ------------------------------------------------------------------

    #[derive(Clone)]
    enum Script {
        Rows(Vec<RawRegistryRecord>),
        Empty,
        Fail,
        Slow(Vec<RawRegistryRecord>, Duration),
    }

    struct MockSource {
        companies: Mutex<Script>,
        licenses: Mutex<Script>,
        companies_calls: AtomicUsize,
        licenses_calls: AtomicUsize,
    }

    impl MockSource {
        fn new(companies: Script, licenses: Script) -> Self {
            MockSource {
                companies: Mutex::new(companies),
                licenses: Mutex::new(licenses),
                companies_calls: AtomicUsize::new(0),
                licenses_calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> (usize, usize) {
            (
                self.companies_calls.load(Ordering::SeqCst),
                self.licenses_calls.load(Ordering::SeqCst),
            )
        }

        async fn run(script: Script) -> Result<Vec<RawRegistryRecord>, RegistryError> {
            match script {
                Script::Rows(rows) => Ok(rows),
                Script::Empty => Ok(Vec::new()),
                Script::Fail => Err(RegistryError::Transport("connection refused".into())),
                Script::Slow(rows, delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(rows)
                }
            }
        }
    }

    #[async_trait::async_trait]
    impl RegistrySource for MockSource {
        async fn fetch_companies(
            &self,
            _id: &CompanyIdentifier,
        ) -> Result<Vec<RawRegistryRecord>, RegistryError> {
            self.companies_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.companies.lock().unwrap().clone();
            Self::run(script).await
        }

        async fn fetch_licenses(
            &self,
            _id: &CompanyIdentifier,
        ) -> Result<Vec<RawRegistryRecord>, RegistryError> {
            self.licenses_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.licenses.lock().unwrap().clone();
            Self::run(script).await
        }
    }

    fn company_row() -> RawRegistryRecord {
        RawRegistryRecord::from_pairs(&[
            ("שם חברה", json!("אלמוג בניה בע~מ")),
            ("שם באנגלית", json!("ALMOG CONSTRUCTION LTD")),
            ("שם עיר", json!("תל אביב")),
            ("שם רחוב", json!("הברזל")),
            ("מספר בית", json!(30)),
            ("אימייל", json!("office@almog.co.il")),
            ("סוג תאגיד", json!("חברה פרטית")),
            ("תאריך התאגדות", json!("15/06/2001")),
            ("סטטוס חברה", json!("פעילה")),
            ("מפרה", json!("")),
            ("שנת דוח שנתי אחרון", json!(Utc::now().year() - 1)),
        ])
    }

    fn license_row(code: &str) -> RawRegistryRecord {
        RawRegistryRecord::from_pairs(&[
            ("MISPAR_KABLAN", json!("77001")),
            ("EMAIL", json!("office@almog.co.il")),
            ("MISPAR_TEL", json!("35551234")),
            ("KVUTZA", json!("100")),
            ("SIVUG", json!(code)),
            ("TEUR_ANAF", json!("בניה")),
            ("TARICH_SUG", json!("2019-03-01T00:00:00")),
            ("HEKEF", json!("4500000")),
        ])
    }

    fn engine(source: MockSource) -> ReconcileEngine<MockSource> {
        let store = ContractorStore::open_in_memory().unwrap();
        ReconcileEngine::new(store, source)
    }

    // ------------------------------------------------------------------
    // Validate
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_invalid_identifier_makes_no_calls() {
        let engine = engine(MockSource::new(
            Script::Rows(vec![company_row()]),
            Script::Rows(vec![license_row("ג5")]),
        ));

        let err = engine
            .reconcile("515782231", &ReconcileOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidIdentifier(_)));
        assert_eq!(engine.source.calls(), (0, 0));
        assert_eq!(engine.store.count().unwrap(), 0);
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_from_both_registries() {
        // Active, not a violator, private, report year is last year →
        // Green; two license rows with the same (type, code) → one entry
        let engine = engine(MockSource::new(
            Script::Rows(vec![company_row()]),
            Script::Rows(vec![license_row("ג5"), license_row("ג5")]),
        ));

        let result = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::Created);
        assert_eq!(engine.store.count().unwrap(), 1);

        let record = &result.record;
        assert_eq!(record.company_id, VALID_ID);
        assert_eq!(record.name.as_deref(), Some("אלמוג בניה בע״מ"));
        assert_eq!(record.company_type, Some(CompanyType::Private));
        assert_eq!(record.status_indicator, StatusIndicator::Green);
        assert_eq!(record.licenses.len(), 1);
        assert_eq!(record.contractor_number.as_deref(), Some("77001"));
        assert_eq!(record.phone.as_deref(), Some("03-5551234"));
        assert_eq!(record.website.as_deref(), Some("www.almog.co.il"));
        assert!(record.status_last_updated.is_some());
        assert!(record.licenses_last_updated.is_some());

        // Exactly one audit event
        let events = engine
            .store
            .events_for("contractor", VALID_ID)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "contractor_created");

        println!("✅ Create test PASSED: {}", result.outcome.as_str());
    }

    #[tokio::test]
    async fn test_create_never_duplicates() {
        let engine = engine(MockSource::new(
            Script::Rows(vec![company_row()]),
            Script::Rows(vec![license_row("ג5")]),
        ));

        engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap();
        engine
            .reconcile(VALID_ID, &ReconcileOptions::forced())
            .await
            .unwrap();

        assert_eq!(engine.store.count().unwrap(), 1);
    }

    // ------------------------------------------------------------------
    // Freshness
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_same_day_second_run_skips_registries() {
        let engine = engine(MockSource::new(
            Script::Rows(vec![company_row()]),
            Script::Rows(vec![license_row("ג5")]),
        ));

        let first = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.source.calls(), (1, 1));

        let second = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap()
            .unwrap();

        // Zero additional registry calls, identical record
        assert_eq!(engine.source.calls(), (1, 1));
        assert_eq!(second.outcome, ReconcileOutcome::LoadedExisting);
        assert!(second.notice.as_deref().unwrap().contains("already existed"));
        assert_eq!(
            serde_json::to_string(&second.record).unwrap(),
            serde_json::to_string(&first.record).unwrap()
        );
    }

    #[tokio::test]
    async fn test_force_refresh_always_fetches() {
        let engine = engine(MockSource::new(
            Script::Rows(vec![company_row()]),
            Script::Rows(vec![license_row("ג5")]),
        ));

        engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap();
        let result = engine
            .reconcile(VALID_ID, &ReconcileOptions::forced())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(engine.source.calls(), (2, 2));
        assert_eq!(result.outcome, ReconcileOutcome::Refreshed);
    }

    #[tokio::test]
    async fn test_only_stale_category_is_fetched() {
        let engine = engine(MockSource::new(
            Script::Rows(vec![company_row()]),
            Script::Rows(vec![license_row("ג5")]),
        ));

        engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap();

        // Age out only the license category
        let id = CompanyIdentifier::parse(VALID_ID).unwrap();
        let mut record = engine.store.get_by_identifier(&id).unwrap().unwrap();
        record.licenses_last_updated =
            Some(Utc::now() - chrono::Duration::days(1));
        engine.store.upsert(&record).unwrap();

        engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap();

        // Companies registry untouched, license registry re-queried
        assert_eq!(engine.source.calls(), (1, 2));
    }

    // ------------------------------------------------------------------
    // Degradation
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_companies_failure_does_not_lose_persisted_fields() {
        // Seed a persisted record with stale freshness
        let store = ContractorStore::open_in_memory().unwrap();
        let id = CompanyIdentifier::parse(VALID_ID).unwrap();
        let mut seeded = ContractorRecord::new(&id);
        seeded.name = Some("שם שמור".to_string());
        seeded.city = Some("חיפה".to_string());
        seeded.status.status = Some("פעילה".to_string());
        seeded.status.violator = Some(false);
        seeded.status_indicator = StatusIndicator::Green;
        seeded.status_last_updated = Some(Utc::now() - chrono::Duration::days(3));
        store.upsert(&seeded).unwrap();

        let source = MockSource::new(Script::Fail, Script::Rows(vec![license_row("ג5")]));
        let engine = ReconcileEngine::new(store, source);

        let result = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap()
            .unwrap();

        // Licenses refreshed; persisted company fields survive untouched
        assert_eq!(result.outcome, ReconcileOutcome::Refreshed);
        assert_eq!(result.record.name.as_deref(), Some("שם שמור"));
        assert_eq!(result.record.city.as_deref(), Some("חיפה"));
        assert_eq!(result.record.status_indicator, StatusIndicator::Green);
        assert_eq!(result.record.licenses.len(), 1);
        assert!(result
            .notice
            .as_deref()
            .unwrap()
            .contains("companies registry unavailable"));

        // Failed category keeps its stale stamp for the next attempt
        assert_eq!(
            result.record.status_last_updated,
            seeded.status_last_updated
        );
    }

    #[tokio::test]
    async fn test_both_down_without_persisted_record_is_lookup_failed() {
        let engine = engine(MockSource::new(Script::Fail, Script::Fail));

        let err = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::LookupFailed { .. }));
        assert_eq!(engine.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_both_down_with_persisted_record_serves_it() {
        let store = ContractorStore::open_in_memory().unwrap();
        let id = CompanyIdentifier::parse(VALID_ID).unwrap();
        let mut seeded = ContractorRecord::new(&id);
        seeded.name = Some("שם שמור".to_string());
        store.upsert(&seeded).unwrap();

        let engine = ReconcileEngine::new(store, MockSource::new(Script::Fail, Script::Fail));

        let result = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::LoadedExisting);
        assert_eq!(result.record.name.as_deref(), Some("שם שמור"));
        assert!(result
            .notice
            .as_deref()
            .unwrap()
            .contains("registries unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_everywhere_returns_none() {
        let engine = engine(MockSource::new(Script::Empty, Script::Empty));

        let result = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(engine.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_one_registry_empty_one_with_data_creates() {
        let engine = engine(MockSource::new(
            Script::Empty,
            Script::Rows(vec![license_row("ג5")]),
        ));

        let result = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::Created);
        // Companies registry had nothing: no status data → Unknown
        assert_eq!(result.record.status_indicator, StatusIndicator::Unknown);
        assert_eq!(result.record.licenses.len(), 1);
    }

    // ------------------------------------------------------------------
    // Deadline
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_deadline_degrades_without_persisting() {
        let engine = engine(MockSource::new(
            Script::Slow(vec![company_row()], Duration::from_secs(60)),
            Script::Slow(vec![license_row("ג5")], Duration::from_secs(60)),
        ));

        let opts = ReconcileOptions {
            force_refresh: false,
            deadline: Some(Duration::from_secs(1)),
        };

        let err = engine.reconcile(VALID_ID, &opts).await.unwrap_err();

        assert!(matches!(err, ReconcileError::LookupFailed { .. }));
        assert_eq!(engine.store.count().unwrap(), 0);
    }

    // ------------------------------------------------------------------
    // Archived records
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_archived_record_is_surfaced_not_reactivated() {
        let store = ContractorStore::open_in_memory().unwrap();
        let id = CompanyIdentifier::parse(VALID_ID).unwrap();
        let mut seeded = ContractorRecord::new(&id);
        seeded.name = Some("שם שמור".to_string());
        seeded.is_active = false;
        seeded.status.status = Some("פעילה".to_string());
        seeded.status.violator = Some(false);
        seeded.status_last_updated = Some(Utc::now());
        seeded.licenses = vec![crate::licenses::LicenseEntry {
            classification_type: "100".to_string(),
            classification_code: "ג5".to_string(),
            description: None,
            license_code: None,
            effective_date: None,
            scale: None,
        }];
        seeded.licenses_last_updated = Some(Utc::now());
        store.upsert(&seeded).unwrap();

        let engine = ReconcileEngine::new(
            store,
            MockSource::new(Script::Rows(vec![company_row()]), Script::Empty),
        );

        let result = engine
            .reconcile(VALID_ID, &ReconcileOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert!(result.notice.as_deref().unwrap().contains("archived"));
        assert!(!result.record.is_active);
    }
}
