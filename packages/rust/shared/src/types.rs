//! Core domain types for company enrichment runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rendered value of a field no provider could resolve.
pub const UNKNOWN_MARKER: &str = "N/A";

/// Rendered value of a field whose enrichment failed.
pub const ERROR_MARKER: &str = "ERROR";

// ---------------------------------------------------------------------------
// CanonicalDomain
// ---------------------------------------------------------------------------

/// Normalized hostname used as the join key across providers.
///
/// Construct through the normalizer in `enricher-core`; this type only
/// carries the already-normalized string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalDomain(String);

impl CanonicalDomain {
    /// Wrap a string that has already been normalized.
    pub fn from_normalized(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// Resolution state of one output field.
///
/// `Unknown` is distinct from an empty string so merge steps can ask
/// whether a field is still unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldValue {
    #[default]
    Unknown,
    Known(String),
    Error,
}

impl FieldValue {
    /// `None`, empty and whitespace-only values are all unknown.
    pub fn from_opt(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self::Known(v),
            _ => Self::Unknown,
        }
    }

    pub fn known(value: impl Into<String>) -> Self {
        Self::from_opt(Some(value.into()))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Replace the value only while it is still unknown.
    pub fn fill(&mut self, candidate: FieldValue) {
        if self.is_unknown() && !candidate.is_unknown() {
            *self = candidate;
        }
    }

    /// Render for output, substituting the sentinel markers.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => UNKNOWN_MARKER,
            Self::Known(v) => v,
            Self::Error => ERROR_MARKER,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MergedCompany
// ---------------------------------------------------------------------------

/// Resolved company record for one canonical domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedCompany {
    pub domain: CanonicalDomain,
    pub company_name: FieldValue,
    pub company_website: FieldValue,
    pub last_email_date: FieldValue,
    pub last_meeting_date: FieldValue,
    pub crm_account_link: FieldValue,
    pub crm_account_owner: FieldValue,
    pub crm_record_link: FieldValue,
    pub year_founded: FieldValue,
    pub company_linkedin: FieldValue,
    pub founder_linkedin: FieldValue,
    pub number_of_employees: FieldValue,
    pub employee_growth_rate: FieldValue,
    pub description: FieldValue,
    pub country: FieldValue,
    pub total_funding: FieldValue,
    pub last_funding: FieldValue,
    pub last_funding_date: FieldValue,
}

impl MergedCompany {
    /// A record with only the website resolved; every other field is unknown.
    pub fn unknown(domain: CanonicalDomain) -> Self {
        let website = FieldValue::known(domain.as_str());
        Self {
            domain,
            company_name: FieldValue::Unknown,
            company_website: website,
            last_email_date: FieldValue::Unknown,
            last_meeting_date: FieldValue::Unknown,
            crm_account_link: FieldValue::Unknown,
            crm_account_owner: FieldValue::Unknown,
            crm_record_link: FieldValue::Unknown,
            year_founded: FieldValue::Unknown,
            company_linkedin: FieldValue::Unknown,
            founder_linkedin: FieldValue::Unknown,
            number_of_employees: FieldValue::Unknown,
            employee_growth_rate: FieldValue::Unknown,
            description: FieldValue::Unknown,
            country: FieldValue::Unknown,
            total_funding: FieldValue::Unknown,
            last_funding: FieldValue::Unknown,
            last_funding_date: FieldValue::Unknown,
        }
    }

    /// Error row for a domain whose enrichment failed: name and website
    /// identify the company, every enrichment field carries the error marker.
    pub fn failed(domain: CanonicalDomain, company_name: Option<&str>) -> Self {
        let name = FieldValue::known(company_name.unwrap_or(domain.as_str()));
        let website = FieldValue::known(domain.as_str());
        Self {
            domain,
            company_name: name,
            company_website: website,
            last_email_date: FieldValue::Error,
            last_meeting_date: FieldValue::Error,
            crm_account_link: FieldValue::Error,
            crm_account_owner: FieldValue::Error,
            crm_record_link: FieldValue::Error,
            year_founded: FieldValue::Error,
            company_linkedin: FieldValue::Error,
            founder_linkedin: FieldValue::Error,
            number_of_employees: FieldValue::Error,
            employee_growth_rate: FieldValue::Error,
            description: FieldValue::Error,
            country: FieldValue::Error,
            total_funding: FieldValue::Error,
            last_funding: FieldValue::Error,
            last_funding_date: FieldValue::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// RowId
// ---------------------------------------------------------------------------

/// Opaque output row identifier. Fresh per row, not stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId(Uuid);

impl RowId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:X}", self.0.simple())
    }
}

// ---------------------------------------------------------------------------
// InputRecord
// ---------------------------------------------------------------------------

/// One data row of the submitted spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    /// Zero-based row position, used to restore input order.
    pub position: usize,
    /// The `company_url` cell as submitted.
    pub raw_url: String,
}

impl InputRecord {
    pub fn new(position: usize, raw_url: impl Into<String>) -> Self {
        Self {
            position,
            raw_url: raw_url.into(),
        }
    }

    /// The submitted URL with surrounding whitespace and trailing slashes removed.
    pub fn source_url(&self) -> &str {
        self.raw_url.trim().trim_end_matches('/')
    }
}
