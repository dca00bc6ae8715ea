// Contractor Registry Reconciliation - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod config;
pub mod error;
pub mod freshness;      // Per-category freshness decisions
pub mod identifier;     // 9-digit company identifier + checksum
pub mod licenses;       // License/classification aggregation
pub mod normalize;      // Raw registry fields → canonical fields
pub mod reconcile;      // Reconciliation orchestrator
pub mod registry;       // data.gov.il registry client
pub mod status;         // Risk status indicator
pub mod store;          // Persisted contractor records (SQLite)

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::ReconcileError;
pub use freshness::{DataCategory, FreshnessCache};
pub use identifier::{validate, CompanyIdentifier, InvalidIdentifier};
pub use licenses::{LicenseAggregator, LicenseEntry, LicenseProfile};
pub use normalize::{CompanyType, NormalizedCompany, RecordNormalizer};
pub use reconcile::{
    ReconcileEngine, ReconcileOptions, ReconcileOutcome, Reconciliation,
};
pub use registry::{
    DataGovClient, RawRegistryRecord, RegistryError, RegistrySource,
};
pub use status::{StatusIndicator, StatusIndicatorEngine, StatusSnapshot};
pub use store::{ContractorRecord, ContractorStore, Event, StoreError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
