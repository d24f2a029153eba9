//! Field merge engine.
//!
//! Precedence, applied in order:
//! 1. the richest metadata record
//! 2. CRM account and company profile, filling unknown fields only
//! 3. the search-index document, only while the last-email date is unknown,
//!    filling unknown fields only
//! 4. the relationship-graph organization, which overwrites the contact dates
//!    and the record link whenever it is present
//!
//! Employee growth is derived last when no source supplied it.

use std::sync::LazyLock;

use enricher_providers::{AttributeRecord, CrmRecord, GraphOrganization};
use enricher_shared::{AppConfig, CanonicalDomain, FieldValue, MergedCompany};
use regex::Regex;

/// Prefixes used to turn provider identifiers into links.
#[derive(Debug, Clone, Default)]
pub struct LinkBases {
    /// `{crm_account}/{id}/view`
    pub crm_account: String,
    /// `{relationship_graph}/{id}`
    pub relationship_graph: String,
}

impl LinkBases {
    fn account_link(&self, id: &str) -> String {
        format!("{}/{id}/view", self.crm_account.trim_end_matches('/'))
    }

    fn record_link(&self, id: &str) -> String {
        format!("{}/{id}", self.relationship_graph.trim_end_matches('/'))
    }
}

impl From<&AppConfig> for LinkBases {
    fn from(config: &AppConfig) -> Self {
        Self {
            crm_account: config.providers.crm.account_link_base.clone(),
            relationship_graph: config.providers.relationship_graph.record_link_base.clone(),
        }
    }
}

/// Everything the providers returned for one domain.
#[derive(Debug, Clone, Default)]
pub struct RawByProvider {
    pub metadata: Vec<AttributeRecord>,
    pub crm: CrmRecord,
    pub search_index: Option<AttributeRecord>,
    pub relationship_graph: Option<GraphOrganization>,
}

/// The metadata record with the most populated fields. Ties go to the
/// earliest record.
pub fn richest(records: &[AttributeRecord]) -> Option<&AttributeRecord> {
    records
        .iter()
        .enumerate()
        .max_by_key(|(index, record)| (record.known_fields(), std::cmp::Reverse(*index)))
        .map(|(_, record)| record)
}

/// Company name from the richest metadata record, else the domain itself.
pub fn company_name(records: &[AttributeRecord], domain: &CanonicalDomain) -> String {
    richest(records)
        .and_then(|r| r.first("Name"))
        .unwrap_or_else(|| domain.as_str().to_string())
}

/// First `linkedin.com/in/<slug>` profile URL in free text.
pub fn extract_linkedin_profile(text: &str) -> Option<String> {
    static PROFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"https?://(?:www\.)?linkedin\.com/in/[A-Za-z0-9_-]+").expect("valid regex")
    });
    PROFILE_RE.find(text).map(|m| m.as_str().to_string())
}

/// Whether the search index should be queried: true when the first two
/// precedence steps leave the last-email date unknown.
pub fn needs_search_index(domain: &CanonicalDomain, raw: &RawByProvider, links: &LinkBases) -> bool {
    let mut state = MergeState::new(domain.clone());
    state.apply_metadata(&raw.metadata, links);
    state.apply_crm(&raw.crm, links);
    state.company.last_email_date.is_unknown()
}

/// Merge all provider answers for `domain` into one company record.
pub fn merge(domain: &CanonicalDomain, raw: &RawByProvider, links: &LinkBases) -> MergedCompany {
    let mut state = MergeState::new(domain.clone());
    state.apply_metadata(&raw.metadata, links);
    state.apply_crm(&raw.crm, links);
    if let Some(doc) = &raw.search_index {
        state.apply_search_index(doc);
    }
    if let Some(org) = &raw.relationship_graph {
        state.apply_relationship_graph(org, links);
    }
    state.finish()
}

// ---------------------------------------------------------------------------
// Merge state
// ---------------------------------------------------------------------------

struct MergeState {
    company: MergedCompany,
    /// Current and year-ago headcount taken from one record.
    growth_basis: Option<(String, String)>,
}

fn field(record: &AttributeRecord, name: &str) -> FieldValue {
    FieldValue::from_opt(record.first(name))
}

fn linkedin_field(record: &AttributeRecord, name: &str) -> FieldValue {
    FieldValue::from_opt(record.first(name).and_then(|t| extract_linkedin_profile(&t)))
}

impl MergeState {
    fn new(domain: CanonicalDomain) -> Self {
        Self {
            company: MergedCompany::unknown(domain),
            growth_basis: None,
        }
    }

    fn note_growth_basis(&mut self, record: &AttributeRecord) {
        if self.growth_basis.is_none() {
            if let (Some(current), Some(prior)) = (
                record.first("Number_of_Employees"),
                record.first("Employees__12_Months_Ago"),
            ) {
                self.growth_basis = Some((current, prior));
            }
        }
    }

    /// Attribute names shared by metadata records and search-index documents.
    fn fill_from_company_document(&mut self, doc: &AttributeRecord) {
        let c = &mut self.company;
        c.company_name.fill(field(doc, "Name"));
        c.description.fill(field(doc, "Description"));
        c.year_founded.fill(field(doc, "Year_Founded"));
        c.number_of_employees.fill(field(doc, "Number_of_Employees"));
        c.employee_growth_rate.fill(field(doc, "Employees__Growth_YoY____"));
        c.company_linkedin.fill(field(doc, "LinkedIn_URL"));
        c.founder_linkedin.fill(linkedin_field(doc, "LinkedIn_Profile__Founders_CEOs_"));
        c.country.fill(field(doc, "Location__Country_"));
        c.total_funding.fill(field(doc, "Total_Funding_Amount__USD_"));
        c.last_funding.fill(field(doc, "Last_Funding_Amount__USD_"));
        c.last_funding_date.fill(field(doc, "Last_Funding_Date"));
        self.note_growth_basis(doc);
    }

    fn apply_metadata(&mut self, records: &[AttributeRecord], links: &LinkBases) {
        let Some(record) = richest(records) else {
            return;
        };
        self.fill_from_company_document(record);

        let c = &mut self.company;
        c.last_email_date.fill(field(record, "Last_Email"));
        c.last_meeting_date.fill(field(record, "Last_Meeting"));
        if let Some(id) = record.first("Organization_Id") {
            c.crm_record_link.fill(FieldValue::known(links.record_link(&id)));
        }
    }

    fn apply_crm(&mut self, crm: &CrmRecord, links: &LinkBases) {
        let c = &mut self.company;

        if let Some(account) = &crm.account {
            if let Some(id) = account.account_id() {
                c.crm_account_link.fill(FieldValue::known(links.account_link(id)));
            }
            c.crm_account_owner
                .fill(FieldValue::from_opt(account.owner_name().map(str::to_string)));
        }

        if let Some(profile) = &crm.profile {
            c.year_founded.fill(field(profile, "Founded_Date"));
            c.company_linkedin.fill(field(profile, "LinkedIn_-_URL"));
            c.number_of_employees.fill(field(profile, "Employee_Count"));
            c.description.fill(field(profile, "Description"));
            c.country.fill(field(profile, "HQ_Region"));
            c.founder_linkedin.fill(linkedin_field(profile, "Founders"));
            c.employee_growth_rate.fill(field(profile, "Employees_-_6_Months_Growth"));
            c.total_funding.fill(field(profile, "Total_Funding_Amount__in_USD_"));
            c.last_funding.fill(field(profile, "Last_Funding_Amount__in_USD_"));
            c.last_funding_date.fill(field(profile, "Last_Funding_Date"));
        }
    }

    fn apply_search_index(&mut self, doc: &AttributeRecord) {
        if !self.company.last_email_date.is_unknown() {
            return;
        }
        self.company.last_email_date.fill(field(doc, "Last_Email"));
        self.fill_from_company_document(doc);
    }

    fn apply_relationship_graph(&mut self, org: &GraphOrganization, links: &LinkBases) {
        let c = &mut self.company;
        c.last_email_date = FieldValue::from_opt(org.last_email_date().map(str::to_string));
        c.last_meeting_date = FieldValue::from_opt(org.last_event_date().map(str::to_string));
        c.crm_record_link =
            FieldValue::from_opt(org.id.as_deref().map(|id| links.record_link(id)));
    }

    fn finish(mut self) -> MergedCompany {
        // Same fallback the CRM batch request is built with.
        if self.company.company_name.is_unknown() && !self.company.domain.as_str().is_empty() {
            self.company.company_name = FieldValue::known(self.company.domain.as_str());
        }
        if self.company.employee_growth_rate.is_unknown() {
            if let Some((current, prior)) = &self.growth_basis {
                self.company.employee_growth_rate = FieldValue::from_opt(growth_rate(current, prior));
            }
        }
        self.company
    }
}

fn parse_count(value: &str) -> Option<f64> {
    value
        .trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// `(current - prior) / prior * 100`, rounded to two decimals.
/// `None` when either count is not numeric or `prior` is zero.
pub fn growth_rate(current: &str, prior: &str) -> Option<String> {
    let current = parse_count(current)?;
    let prior = parse_count(prior)?;
    if prior == 0.0 {
        return None;
    }
    let rate = (current - prior) / prior * 100.0;
    let rounded = (rate * 100.0).round() / 100.0;
    // Avoid rendering "-0.00".
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    rounded.is_finite().then(|| format!("{rounded:.2}"))
}
