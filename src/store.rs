// 💾 Persisted Store - canonical contractor records in SQLite
// One row per company identifier, enforced by a UNIQUE index and an
// ON CONFLICT upsert: two concurrent reconciliations of the same
// identifier can never race into duplicate rows.

use crate::freshness::DataCategory;
use crate::identifier::CompanyIdentifier;
use crate::licenses::LicenseEntry;
use crate::normalize::CompanyType;
use crate::status::{StatusIndicator, StatusSnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

// ============================================================================
// CONTRACTOR RECORD
// ============================================================================

/// The canonical, persisted representation of a contractor.
///
/// Owned by the store; the engine only reads and upserts. Records are
/// never deleted here; deactivation/archival belongs to external
/// collaborators, which write `is_active` through their own save path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractorRecord {
    /// Stable internal identity (UUID) - never changes
    pub id: String,

    /// The 9-digit company identifier (natural key, unique)
    pub company_id: String,

    /// License-registry contractor number, when known
    pub contractor_number: Option<String>,

    /// Company name (native)
    pub name: Option<String>,

    /// Company name (transliterated/English)
    pub name_english: Option<String>,

    pub company_type: Option<CompanyType>,
    pub foundation_date: Option<NaiveDate>,

    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,

    /// Deduplicated license/classification entries
    pub licenses: Vec<LicenseEntry>,

    /// Raw status block as last seen in the companies registry
    pub status: StatusSnapshot,

    /// Derived three-state risk signal
    pub status_indicator: StatusIndicator,

    /// Per-category freshness stamps
    pub status_last_updated: Option<DateTime<Utc>>,
    pub licenses_last_updated: Option<DateTime<Utc>>,

    /// Written by external collaborators (archival); only read here
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractorRecord {
    /// Fresh empty record for an identifier.
    pub fn new(id: &CompanyIdentifier) -> Self {
        let now = Utc::now();

        ContractorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: id.as_str().to_string(),
            contractor_number: None,
            name: None,
            name_english: None,
            company_type: None,
            foundation_date: None,
            city: None,
            address: None,
            phone: None,
            email: None,
            website: None,
            licenses: Vec::new(),
            status: StatusSnapshot::default(),
            status_indicator: StatusIndicator::Unknown,
            status_last_updated: None,
            licenses_last_updated: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a category currently holds any data (feeds the freshness
    /// check: an empty category is never fresh).
    pub fn has_data(&self, category: DataCategory) -> bool {
        match category {
            DataCategory::Status => !self.status.is_blank(),
            DataCategory::Licenses => !self.licenses.is_empty(),
        }
    }

    pub fn last_updated(&self, category: DataCategory) -> Option<DateTime<Utc>> {
        match category {
            DataCategory::Status => self.status_last_updated,
            DataCategory::Licenses => self.licenses_last_updated,
        }
    }
}

// ============================================================================
// AUDIT EVENT
// ============================================================================

/// Audit-trail event; every reconciliation that writes the store leaves one.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// STORE ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

// ============================================================================
// CONTRACTOR STORE
// ============================================================================

/// SQLite-backed store shared between the async engine and the binaries.
#[derive(Clone)]
pub struct ContractorStore {
    conn: Arc<Mutex<Connection>>,
}

impl ContractorStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = ContractorStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.setup()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = ContractorStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.setup()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    fn setup(&self) -> Result<(), StoreError> {
        let conn = self.lock();

        // WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS contractors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_uuid TEXT NOT NULL,
                company_id TEXT UNIQUE NOT NULL,
                contractor_number TEXT,
                name TEXT,
                name_english TEXT,
                company_type TEXT,
                foundation_date TEXT,
                city TEXT,
                address TEXT,
                phone TEXT,
                email TEXT,
                website TEXT,
                licenses TEXT NOT NULL,
                status TEXT NOT NULL,
                status_indicator TEXT NOT NULL,
                status_last_updated TEXT,
                licenses_last_updated TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                data TEXT NOT NULL,
                actor TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contractors_company_id
             ON contractors(company_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_entity
             ON events(entity_type, entity_id)",
            [],
        )?;

        Ok(())
    }

    /// Look up the canonical record for an identifier.
    pub fn get_by_identifier(
        &self,
        id: &CompanyIdentifier,
    ) -> Result<Option<ContractorRecord>, StoreError> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT record_uuid, company_id, contractor_number, name, name_english,
                    company_type, foundation_date, city, address, phone, email,
                    website, licenses, status, status_indicator,
                    status_last_updated, licenses_last_updated, is_active,
                    created_at, updated_at
             FROM contractors
             WHERE company_id = ?1",
        )?;

        let mut rows = stmt.query(params![id.as_str()])?;

        match rows.next()? {
            Some(row) => Ok(Some(record_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Insert or update the record keyed by its identifier, atomically.
    ///
    /// An existing row keeps its autoincrement id, record UUID and
    /// created_at; everything else is replaced with the merged record.
    /// Returns the record as stored.
    pub fn upsert(&self, record: &ContractorRecord) -> Result<ContractorRecord, StoreError> {
        {
            let conn = self.lock();

            let licenses_json = serde_json::to_string(&record.licenses)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let status_json = serde_json::to_string(&record.status)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let company_type_json = serde_json::to_string(&record.company_type)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;

            conn.execute(
                "INSERT INTO contractors (
                    record_uuid, company_id, contractor_number, name, name_english,
                    company_type, foundation_date, city, address, phone, email,
                    website, licenses, status, status_indicator,
                    status_last_updated, licenses_last_updated, is_active,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                          ?14, ?15, ?16, ?17, ?18, ?19, ?20)
                ON CONFLICT(company_id) DO UPDATE SET
                    contractor_number = excluded.contractor_number,
                    name = excluded.name,
                    name_english = excluded.name_english,
                    company_type = excluded.company_type,
                    foundation_date = excluded.foundation_date,
                    city = excluded.city,
                    address = excluded.address,
                    phone = excluded.phone,
                    email = excluded.email,
                    website = excluded.website,
                    licenses = excluded.licenses,
                    status = excluded.status,
                    status_indicator = excluded.status_indicator,
                    status_last_updated = excluded.status_last_updated,
                    licenses_last_updated = excluded.licenses_last_updated,
                    updated_at = excluded.updated_at",
                params![
                    record.id,
                    record.company_id,
                    record.contractor_number,
                    record.name,
                    record.name_english,
                    company_type_json,
                    record.foundation_date.map(|d| d.to_string()),
                    record.city,
                    record.address,
                    record.phone,
                    record.email,
                    record.website,
                    licenses_json,
                    status_json,
                    record.status_indicator.as_str(),
                    record.status_last_updated.map(|dt| dt.to_rfc3339()),
                    record.licenses_last_updated.map(|dt| dt.to_rfc3339()),
                    record.is_active as i64,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
        }

        // Read back: the conflict path keeps the original identity fields
        let id = CompanyIdentifier::parse(&record.company_id)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        self.get_by_identifier(&id)?
            .ok_or_else(|| StoreError::Corrupt("upserted record not found".to_string()))
    }

    /// All persisted identifiers (for bulk revalidation).
    pub fn all_identifiers(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT company_id FROM contractors ORDER BY company_id")?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM contractors", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Append an audit event.
    pub fn record_event(&self, event: &Event) -> Result<(), StoreError> {
        let conn = self.lock();
        let data_json = serde_json::to_string(&event.data)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )?;

        Ok(())
    }

    /// Audit events for one entity, newest first.
    pub fn events_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY timestamp DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, entity_id], |row| {
                let timestamp_str: String = row.get(1)?;
                let data_json: String = row.get(5)?;

                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data_json).unwrap_or_default(),
                    actor: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

/// Map one contractors row back into a record.
fn record_from_row(row: &rusqlite::Row<'_>) -> Result<ContractorRecord, StoreError> {
    let company_type_json: String = row.get(5)?;
    let foundation_date_str: Option<String> = row.get(6)?;
    let licenses_json: String = row.get(12)?;
    let status_json: String = row.get(13)?;
    let indicator_str: String = row.get(14)?;
    let status_updated_str: Option<String> = row.get(15)?;
    let licenses_updated_str: Option<String> = row.get(16)?;
    let is_active: i64 = row.get(17)?;
    let created_at_str: String = row.get(18)?;
    let updated_at_str: String = row.get(19)?;

    let company_type: Option<CompanyType> = serde_json::from_str(&company_type_json)
        .map_err(|e| StoreError::Corrupt(format!("company_type: {e}")))?;
    let licenses: Vec<LicenseEntry> = serde_json::from_str(&licenses_json)
        .map_err(|e| StoreError::Corrupt(format!("licenses: {e}")))?;
    let status: StatusSnapshot = serde_json::from_str(&status_json)
        .map_err(|e| StoreError::Corrupt(format!("status: {e}")))?;

    let status_indicator = StatusIndicator::parse(&indicator_str)
        .ok_or_else(|| StoreError::Corrupt(format!("status_indicator: {indicator_str:?}")))?;

    Ok(ContractorRecord {
        id: row.get(0)?,
        company_id: row.get(1)?,
        contractor_number: row.get(2)?,
        name: row.get(3)?,
        name_english: row.get(4)?,
        company_type,
        foundation_date: foundation_date_str.and_then(|s| s.parse().ok()),
        city: row.get(7)?,
        address: row.get(8)?,
        phone: row.get(9)?,
        email: row.get(10)?,
        website: row.get(11)?,
        licenses,
        status,
        status_indicator,
        status_last_updated: parse_utc(status_updated_str),
        licenses_last_updated: parse_utc(licenses_updated_str),
        is_active: is_active != 0,
        created_at: parse_utc(Some(created_at_str)).unwrap_or_else(Utc::now),
        updated_at: parse_utc(Some(updated_at_str)).unwrap_or_else(Utc::now),
    })
}

fn parse_utc(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// TESTS
// ============================================================================
