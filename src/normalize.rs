// 🧹 Record Normalizer - raw registry fields → canonical fields
// The only module that knows the companies-registry column names.
// Everything downstream works with typed, cleaned values.

use crate::identifier::CompanyIdentifier;
use crate::registry::RawRegistryRecord;
use crate::status::StatusSnapshot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// COMPANIES REGISTRY FIELD MAP
// ============================================================================

/// Column names of the companies-registry dataset. Hebrew, verbatim from
/// the upstream schema.
mod field {
    pub const NAME: &str = "שם חברה";
    pub const NAME_ENGLISH: &str = "שם באנגלית";
    pub const CITY: &str = "שם עיר";
    pub const STREET: &str = "שם רחוב";
    pub const HOUSE_NUMBER: &str = "מספר בית";
    pub const PHONE: &str = "מספר טלפון";
    pub const EMAIL: &str = "אימייל";
    pub const WEBSITE: &str = "אתר אינטרנט";
    pub const CORP_TYPE: &str = "סוג תאגיד";
    pub const FOUNDATION_DATE: &str = "תאריך התאגדות";
    pub const STATUS: &str = "סטטוס חברה";
    pub const VIOLATOR: &str = "מפרה";
    pub const RESTRICTIONS: &str = "מגבלות";
    pub const LAST_REPORT_YEAR: &str = "שנת דוח שנתי אחרון";
}

/// Upstream exports the gershayim in company names as a tilde ("בע~מ").
const NAME_ARTIFACT: &str = "בע~מ";
const NAME_ARTIFACT_FIXED: &str = "בע״מ";

/// A restrictions value that just means "limited company", not a risk.
const RESTRICTION_PLACEHOLDER: &str = "מוגבלת";

/// Email domains that never stand for a company website.
const FREE_EMAIL_PROVIDERS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "walla.co.il",
    "nana10.co.il",
];

// ============================================================================
// COMPANY TYPE
// ============================================================================

/// Company-type classification. Sourced from the registry's corporate-type
/// column when present, otherwise derived from the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyType {
    Government,
    Private,
    Public,
    Foreign,
    Cooperative,
    NonProfit,
    LicensedDealer,
    ExemptDealer,
    Partnership,
}

impl CompanyType {
    /// Display string, matching the vocabulary the rest of the system uses.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyType::Government => "חברה ממשלתית",
            CompanyType::Private => "חברה פרטית",
            CompanyType::Public => "חברה ציבורית",
            CompanyType::Foreign => "חברה זרה",
            CompanyType::Cooperative => "אגודה שיתופית",
            CompanyType::NonProfit => "עמותה",
            CompanyType::LicensedDealer => "עוסק מורשה",
            CompanyType::ExemptDealer => "עוסק פטור",
            CompanyType::Partnership => "שותפות",
        }
    }

    /// Map the registry's free-text corporate type, when it carries one.
    pub fn from_registry(corp_type: &str) -> Option<CompanyType> {
        if corp_type.contains("ציבורית") {
            Some(CompanyType::Public)
        } else if corp_type.contains("פרטית") {
            Some(CompanyType::Private)
        } else if corp_type.contains("ממשלתית") {
            Some(CompanyType::Government)
        } else if corp_type.contains("זרה") {
            Some(CompanyType::Foreign)
        } else if corp_type.contains("אגודה") {
            Some(CompanyType::Cooperative)
        } else if corp_type.contains("עמותה") {
            Some(CompanyType::NonProfit)
        } else if corp_type.contains("שותפות") {
            Some(CompanyType::Partnership)
        } else {
            None
        }
    }

    /// Derive from the identifier's leading digits. The registry allocates
    /// number ranges per entity kind; default is a private company.
    pub fn from_identifier(id: &CompanyIdentifier) -> CompanyType {
        match id.prefix2() {
            "50" => CompanyType::Government,
            "51" => CompanyType::Private,
            "52" => CompanyType::Public,
            "53" => CompanyType::Foreign,
            "54" => CompanyType::Cooperative,
            "55" => CompanyType::NonProfit,
            _ => match id.prefix1() {
                "6" => CompanyType::LicensedDealer,
                "7" => CompanyType::ExemptDealer,
                "8" => CompanyType::Partnership,
                _ => CompanyType::Private,
            },
        }
    }
}

// ============================================================================
// NORMALIZED COMPANY
// ============================================================================

/// Canonical fields extracted from one companies-registry row.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCompany {
    pub name: Option<String>,
    pub name_english: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub company_type: Option<CompanyType>,
    pub foundation_date: Option<NaiveDate>,
    pub status: StatusSnapshot,
}

// ============================================================================
// RECORD NORMALIZER
// ============================================================================

pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        RecordNormalizer
    }

    /// Normalize the first companies-registry row for an identifier.
    pub fn normalize_company(
        &self,
        id: &CompanyIdentifier,
        record: &RawRegistryRecord,
    ) -> NormalizedCompany {
        let name = record.text(field::NAME).map(|s| self.clean_text(&s));
        let name_english = record.text(field::NAME_ENGLISH).map(|s| self.clean_text(&s));
        let city = record.text(field::CITY).map(|s| self.clean_text(&s));

        let address = {
            let street = record.text(field::STREET).unwrap_or_default();
            let house = record.text(field::HOUSE_NUMBER).unwrap_or_default();
            let joined = self.clean_text(&format!("{} {}", street, house));
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        };

        let phone = record
            .text(field::PHONE)
            .and_then(|p| self.format_phone(&p));
        let email = record.text(field::EMAIL);

        let website = record.text(field::WEBSITE).or_else(|| {
            email
                .as_deref()
                .and_then(|e| self.website_from_email(e))
        });

        let company_type = record
            .text(field::CORP_TYPE)
            .and_then(|t| CompanyType::from_registry(&t))
            .or(Some(CompanyType::from_identifier(id)));

        let foundation_date = record
            .text(field::FOUNDATION_DATE)
            .and_then(|d| self.convert_date(&d));

        NormalizedCompany {
            name,
            name_english,
            city,
            address,
            phone,
            email,
            website,
            company_type,
            foundation_date,
            status: self.status_snapshot(record),
        }
    }

    /// Extract the status block, preserving field absence (absence drives
    /// the Unknown indicator downstream).
    pub fn status_snapshot(&self, record: &RawRegistryRecord) -> StatusSnapshot {
        let status = record.text(field::STATUS);

        // A present-but-blank violator column means "not a violator";
        // a missing column means the registry sent no signal at all.
        let violator = if record.has(field::VIOLATOR) {
            Some(record.text(field::VIOLATOR).is_some())
        } else {
            None
        };

        let restrictions = record
            .text(field::RESTRICTIONS)
            .filter(|r| r != RESTRICTION_PLACEHOLDER)
            .map(|r| vec![r])
            .unwrap_or_default();

        StatusSnapshot {
            status,
            violator,
            restrictions,
            last_report_year: record.year(field::LAST_REPORT_YEAR),
        }
    }

    /// Collapse whitespace runs, trim, and repair the known gershayim
    /// export artifact.
    pub fn clean_text(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.replace(NAME_ARTIFACT, NAME_ARTIFACT_FIXED)
    }

    /// Israeli phone formatting.
    ///
    /// Strip non-digits, ensure a leading zero, then:
    /// 10 digits → `XXX-XXXXXXX` (mobile), 9 → `XX-XXXXXXX` (landline),
    /// 8 → prepend another zero and split `X-XXXXXXX`; anything else is
    /// passed through unformatted.
    pub fn format_phone(&self, raw: &str) -> Option<String> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }

        let with_zero = if digits.starts_with('0') {
            digits
        } else {
            format!("0{}", digits)
        };

        let formatted = match with_zero.len() {
            10 => format!("{}-{}", &with_zero[..3], &with_zero[3..]),
            9 => format!("{}-{}", &with_zero[..2], &with_zero[2..]),
            8 => format!("0{}-{}", &with_zero[..1], &with_zero[1..]),
            _ => with_zero,
        };

        Some(formatted)
    }

    /// `dd/mm/yyyy` → ISO date. Unparseable input is dropped, never
    /// defaulted.
    pub fn convert_date(&self, raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()
    }

    /// Derive a website from an email domain, unless the domain belongs to
    /// a free/personal provider.
    pub fn website_from_email(&self, email: &str) -> Option<String> {
        let domain = email.split('@').nth(1)?.trim().to_lowercase();
        if domain.is_empty() || FREE_EMAIL_PROVIDERS.contains(&domain.as_str()) {
            return None;
        }
        Some(format!("www.{}", domain))
    }
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
