//! Provider wire records, decoded defensively.
//!
//! Providers omit fields, send `null` where an array was expected, and mix
//! numbers with strings. None of that is an error here: absence decodes to
//! `None` or an empty collection and surfaces later as an unknown field.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// Accept a string or a number; anything else is absent.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(&Value::deserialize(deserializer)?))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Decode a nested object; a value of the wrong shape is absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(decode_entry(Value::deserialize(deserializer)?))
}

/// Like [`lenient`], but falls back to `T::default()`.
fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(decode_entry(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// A list that keeps the entries it can decode. Anything but an array is empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(decode_entries(Value::deserialize(deserializer)?))
}

/// A map of lists, each decoded like [`lenient_list`].
fn lenient_list_map<'de, D, T>(deserializer: D) -> Result<HashMap<String, Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(key, value)| (key, decode_entries(value)))
            .collect(),
        _ => HashMap::new(),
    })
}

fn decode_entries<T: DeserializeOwned>(value: Value) -> Vec<T> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(decode_entry).collect(),
        _ => Vec::new(),
    }
}

fn decode_entry<T: DeserializeOwned>(value: Value) -> Option<T> {
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value)
        .inspect_err(|e| debug!(error = %e, "ignoring undecodable provider entry"))
        .ok()
}

// ---------------------------------------------------------------------------
// AttributeRecord
// ---------------------------------------------------------------------------

/// A document whose attributes are usually single-valued arrays,
/// e.g. `{"Name": ["Acme"], "Year_Founded": [2015]}`.
///
/// Used for metadata records, search-index documents and CRM company profiles.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct AttributeRecord(HashMap<String, Value>);

impl AttributeRecord {
    /// First value of `field` as a string. Bare scalars are accepted too.
    pub fn first(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::Array(items) => items.first().and_then(scalar_to_string),
            other => scalar_to_string(other),
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.first(field).is_some()
    }

    /// Number of attributes carrying a usable value.
    pub fn known_fields(&self) -> usize {
        self.0.keys().filter(|k| self.has(k)).count()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for AttributeRecord {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ---------------------------------------------------------------------------
// CRM
// ---------------------------------------------------------------------------

/// Response of the CRM batch endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrmBatchResponse {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub salesforce: CrmAccountSections,
    #[serde(default, deserialize_with = "lenient_list")]
    pub specter: Vec<AttributeRecord>,
}

/// Accounts matched by website and by company name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrmAccountSections {
    #[serde(default, deserialize_with = "lenient_list_map")]
    pub websites: HashMap<String, Vec<CrmAccount>>,
    #[serde(default, deserialize_with = "lenient_list_map")]
    pub names: HashMap<String, Vec<CrmAccount>>,
}

impl CrmBatchResponse {
    /// The account for a company: website match first, then name match.
    pub fn account_for(&self, website: &str, name: &str) -> Option<&CrmAccount> {
        first_account(&self.salesforce.websites, website)
            .or_else(|| first_account(&self.salesforce.names, name))
    }

    /// The company profile whose `Company_Name` equals `name`.
    pub fn profile_for(&self, name: &str) -> Option<&AttributeRecord> {
        self.specter
            .iter()
            .find(|profile| profile.first("Company_Name").as_deref() == Some(name))
    }
}

fn first_account<'a>(
    section: &'a HashMap<String, Vec<CrmAccount>>,
    key: &str,
) -> Option<&'a CrmAccount> {
    section.get(key).and_then(|accounts| accounts.first())
}

/// One CRM account row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CrmAccount {
    #[serde(rename = "Id", default, deserialize_with = "scalar_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub attributes: Option<AccountAttributes>,
    #[serde(rename = "Owner", default, deserialize_with = "lenient")]
    pub owner: Option<AccountOwner>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountAttributes {
    #[serde(default, deserialize_with = "scalar_string")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountOwner {
    #[serde(rename = "Name", default, deserialize_with = "scalar_string")]
    pub name: Option<String>,
}

impl CrmAccount {
    /// Account id: last path segment of `attributes.url`, else `Id`.
    pub fn account_id(&self) -> Option<&str> {
        self.attributes
            .as_ref()
            .and_then(|a| a.url.as_deref())
            .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
            .filter(|segment| !segment.is_empty())
            .or(self.id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner
            .as_ref()
            .and_then(|o| o.name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

/// Response of the CRM REST query endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmQueryResponse {
    #[serde(default)]
    pub total_size: u64,
    #[serde(default, deserialize_with = "lenient_list")]
    pub records: Vec<CrmAccount>,
}

// ---------------------------------------------------------------------------
// Search index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub response: SearchDocs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchDocs {
    #[serde(default, deserialize_with = "lenient_list")]
    pub docs: Vec<AttributeRecord>,
}

// ---------------------------------------------------------------------------
// Relationship graph
// ---------------------------------------------------------------------------

/// One page of the organizations search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphPage {
    #[serde(default, deserialize_with = "lenient_list")]
    pub organizations: Vec<GraphOrganization>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GraphOrganization {
    #[serde(default, deserialize_with = "scalar_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub interaction_dates: Option<InteractionDates>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InteractionDates {
    #[serde(default, deserialize_with = "scalar_string")]
    pub last_email_date: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub last_event_date: Option<String>,
}

impl GraphOrganization {
    pub fn last_email_date(&self) -> Option<&str> {
        self.interaction_dates
            .as_ref()
            .and_then(|d| d.last_email_date.as_deref())
    }

    pub fn last_event_date(&self) -> Option<&str> {
        self.interaction_dates
            .as_ref()
            .and_then(|d| d.last_event_date.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn attribute_record_reads_first_scalar() {
        let record: AttributeRecord = serde_json::from_value(json!({
            "Name": ["Acme", "Acme Inc"],
            "Year_Founded": [2015],
            "Description": "bare string",
            "Country": [],
            "Funding": [null],
            "Blank": [""],
        }))
        .unwrap();

        assert_eq!(record.first("Name").as_deref(), Some("Acme"));
        assert_eq!(record.first("Year_Founded").as_deref(), Some("2015"));
        assert_eq!(record.first("Description").as_deref(), Some("bare string"));
        assert_eq!(record.first("Country"), None);
        assert_eq!(record.first("Funding"), None);
        assert_eq!(record.first("Blank"), None);
        assert_eq!(record.first("Missing"), None);
        assert_eq!(record.known_fields(), 3);
    }

    #[test]
    fn crm_batch_tolerates_nulls() {
        let batch: CrmBatchResponse = serde_json::from_value(json!({
            "salesforce": null,
            "specter": null,
        }))
        .unwrap();
        assert!(batch.account_for("acme.com", "Acme").is_none());

        let batch: CrmBatchResponse = serde_json::from_value(json!({
            "salesforce": {"websites": {"acme.com": null}},
        }))
        .unwrap();
        assert!(batch.account_for("acme.com", "Acme").is_none());
    }

    #[test]
    fn crm_batch_prefers_website_match() {
        let batch: CrmBatchResponse = serde_json::from_value(json!({
            "salesforce": {
                "websites": {"acme.com": [{"Id": "001W", "Owner": {"Name": "Web Owner"}}]},
                "names": {"Acme": [{"Id": "001N", "Owner": {"Name": "Name Owner"}}]}
            },
            "specter": [{"Company_Name": ["Other"]}, {"Company_Name": ["Acme"], "HQ_Region": ["Europe"]}]
        }))
        .unwrap();

        let account = batch.account_for("acme.com", "Acme").unwrap();
        assert_eq!(account.account_id(), Some("001W"));
        assert_eq!(account.owner_name(), Some("Web Owner"));

        let by_name = batch.account_for("other.com", "Acme").unwrap();
        assert_eq!(by_name.account_id(), Some("001N"));

        let profile = batch.profile_for("Acme").unwrap();
        assert_eq!(profile.first("HQ_Region").as_deref(), Some("Europe"));
    }

    #[test]
    fn one_malformed_account_does_not_sink_the_batch() {
        let batch: CrmBatchResponse = serde_json::from_value(json!({
            "salesforce": {
                "websites": {
                    "acme.com": [{"Id": "001A", "Owner": {"Name": "Dana"}}],
                    "globex.io": [{"Id": "001G", "Owner": "Sam"}],
                    "initech.com": ["not an account", {"Id": "001I", "attributes": 7}],
                    "hooli.com": {"Id": "001H"}
                },
                "names": "unexpected"
            },
            "specter": [{"Company_Name": ["Acme"]}, 42]
        }))
        .unwrap();

        let acme = batch.account_for("acme.com", "Acme").unwrap();
        assert_eq!(acme.owner_name(), Some("Dana"));

        let globex = batch.account_for("globex.io", "Globex").unwrap();
        assert_eq!(globex.account_id(), Some("001G"));
        assert_eq!(globex.owner_name(), None);

        let initech = batch.account_for("initech.com", "Initech").unwrap();
        assert_eq!(initech.account_id(), Some("001I"));

        assert!(batch.account_for("hooli.com", "Hooli").is_none());
        assert_eq!(batch.specter.len(), 1);
    }

    #[test]
    fn account_id_prefers_attribute_url_segment() {
        let account: CrmAccount = serde_json::from_value(json!({
            "Id": "fallback",
            "attributes": {"url": "/services/data/v58.0/sobjects/Account/001ABC"}
        }))
        .unwrap();
        assert_eq!(account.account_id(), Some("001ABC"));

        let account: CrmAccount = serde_json::from_value(json!({"Id": "001XYZ"})).unwrap();
        assert_eq!(account.account_id(), Some("001XYZ"));

        assert_eq!(CrmAccount::default().account_id(), None);
    }

    #[test]
    fn graph_organization_accepts_numeric_id() {
        let page: GraphPage = serde_json::from_value(json!({
            "organizations": [{
                "id": 64779194,
                "name": "Acme",
                "interaction_dates": {"last_email_date": "2024-03-01T10:00:00Z", "last_event_date": null}
            }],
            "next_page_token": null
        }))
        .unwrap();

        let org = &page.organizations[0];
        assert_eq!(org.id.as_deref(), Some("64779194"));
        assert_eq!(org.last_email_date(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(org.last_event_date(), None);
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn graph_page_skips_malformed_organizations() {
        let page: GraphPage = serde_json::from_value(json!({
            "organizations": [
                {"id": 1, "interaction_dates": "bad"},
                "not an organization",
                {"id": 2, "interaction_dates": {"last_email_date": 20240301, "last_event_date": {}}}
            ],
            "next_page_token": "p2"
        }))
        .unwrap();

        assert_eq!(page.organizations.len(), 2);
        assert_eq!(page.organizations[0].interaction_dates, None);
        assert_eq!(page.organizations[1].last_email_date(), Some("20240301"));
        assert_eq!(page.organizations[1].last_event_date(), None);
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
    }
}
