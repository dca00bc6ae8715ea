// 🚨 Error taxonomy for reconciliation
// Propagation policy: field-level parse failures and single-registry
// failures are recovered locally (logged, degraded to "no new data") and
// never escalate. Only invalid identifiers and a total lookup failure
// reach the caller as errors.

use crate::identifier::InvalidIdentifier;
use crate::registry::RegistryError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Checksum failure - rejected before any network access, never
    /// retried.
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    /// Both registries unavailable and no persisted record to fall back
    /// to. The only condition that aborts a reconciliation outright.
    #[error(
        "lookup failed for {id}: companies registry: {companies}; license registry: {licenses}"
    )]
    LookupFailed {
        id: String,
        companies: RegistryError,
        licenses: RegistryError,
    },

    /// The persisted store itself failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
