// 🚦 Status Indicator Engine - derive a three-state risk signal
// Decision table over the companies-registry status fields:
//   violator → Red
//   not active → Yellow
//   active private company with a stale annual report → Yellow
//   otherwise → Green
//   no status/violator data at all → Unknown (never defaulted)

use crate::normalize::CompanyType;
use serde::{Deserialize, Serialize};

/// Registry value meaning the company is in good standing.
pub const STATUS_ACTIVE: &str = "פעילה";

/// An annual report older than this many years flags a private company.
const STALE_REPORT_YEARS: i32 = 2;

// ============================================================================
// STATUS INDICATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusIndicator {
    Green,
    Yellow,
    Red,
    /// The registry supplied no status data; must never be read as
    /// Green or Red.
    Unknown,
}

impl StatusIndicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusIndicator::Green => "green",
            StatusIndicator::Yellow => "yellow",
            StatusIndicator::Red => "red",
            StatusIndicator::Unknown => "unknown",
        }
    }

    /// Inverse of [`as_str`], for rows coming back from the store.
    pub fn parse(s: &str) -> Option<StatusIndicator> {
        match s {
            "green" => Some(StatusIndicator::Green),
            "yellow" => Some(StatusIndicator::Yellow),
            "red" => Some(StatusIndicator::Red),
            "unknown" => Some(StatusIndicator::Unknown),
            _ => None,
        }
    }
}

// ============================================================================
// STATUS SNAPSHOT
// ============================================================================

/// The status-relevant fields extracted from one companies-registry row.
///
/// `status`/`violator` are `None` when the registry row did not carry the
/// field at all; that absence is what drives the Unknown override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: Option<String>,
    pub violator: Option<bool>,
    pub restrictions: Vec<String>,
    pub last_report_year: Option<i32>,
}

impl StatusSnapshot {
    /// True when the source carried neither a status nor a violator flag.
    pub fn is_blank(&self) -> bool {
        self.status.is_none() && self.violator.is_none()
    }
}

// ============================================================================
// STATUS INDICATOR ENGINE
// ============================================================================

pub struct StatusIndicatorEngine;

impl StatusIndicatorEngine {
    pub fn new() -> Self {
        StatusIndicatorEngine
    }

    /// Evaluate the decision table, in order.
    ///
    /// `current_year` is passed in rather than read from the clock so the
    /// report-year rule is deterministic under test.
    pub fn evaluate(
        &self,
        snapshot: &StatusSnapshot,
        company_type: Option<CompanyType>,
        current_year: i32,
    ) -> StatusIndicator {
        // Absent source data overrides everything
        if snapshot.is_blank() {
            return StatusIndicator::Unknown;
        }

        if snapshot.violator == Some(true) {
            return StatusIndicator::Red;
        }

        if let Some(status) = &snapshot.status {
            if status != STATUS_ACTIVE {
                return StatusIndicator::Yellow;
            }
        }

        // Active, not a violator: private companies must file annually
        if company_type == Some(CompanyType::Private) {
            if let Some(report_year) = snapshot.last_report_year {
                if current_year - report_year > STALE_REPORT_YEARS {
                    return StatusIndicator::Yellow;
                }
            }
        }

        StatusIndicator::Green
    }
}

impl Default for StatusIndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
