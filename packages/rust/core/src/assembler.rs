//! Spreadsheet in, spreadsheet out.
//!
//! [`parse_input`] turns the uploaded CSV into index-tagged
//! [`InputRecord`]s; [`assemble`] projects a merged company onto the fixed
//! output schema; [`serialize`] writes the rows back in input order with
//! every field quoted.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use tracing::{debug, instrument};

use enricher_shared::{EnricherError, InputRecord, MergedCompany, Result, RowId};

/// Name of the input column holding the company URL. Matched
/// case-insensitively.
pub const URL_COLUMN: &str = "company_url";

/// Output header, in column order.
pub const OUTPUT_COLUMNS: [&str; 19] = [
    "ID",
    "Source URL",
    "Company Name",
    "Company Website",
    "Last Email Date",
    "Last Meeting Date",
    "CRM Account Link",
    "CRM Account Owner",
    "CRM Record Link",
    "Year Founded",
    "Company LinkedIn",
    "Founder LinkedIn",
    "Number of Employees",
    "Employee Growth Rate",
    "Description",
    "Country",
    "Total Funding",
    "Last Funding",
    "Last Funding Date",
];

/// One output row, tagged with the position of the input row it answers.
#[derive(Debug, Clone)]
pub struct OutputRow {
    pub position: usize,
    pub id: RowId,
    pub source_url: String,
    pub company: MergedCompany,
}

impl OutputRow {
    fn fields(&self) -> [String; 19] {
        let c = &self.company;
        [
            self.id.to_string(),
            self.source_url.clone(),
            c.company_name.to_string(),
            c.company_website.to_string(),
            c.last_email_date.to_string(),
            c.last_meeting_date.to_string(),
            c.crm_account_link.to_string(),
            c.crm_account_owner.to_string(),
            c.crm_record_link.to_string(),
            c.year_founded.to_string(),
            c.company_linkedin.to_string(),
            c.founder_linkedin.to_string(),
            c.number_of_employees.to_string(),
            c.employee_growth_rate.to_string(),
            c.description.to_string(),
            c.country.to_string(),
            c.total_funding.to_string(),
            c.last_funding.to_string(),
            c.last_funding_date.to_string(),
        ]
    }
}

/// Decode the uploaded spreadsheet.
///
/// Every data row yields a record, including rows whose URL cell is empty or
/// missing, so the output can match the input row for row.
#[instrument(skip_all, fields(bytes = input.len()))]
pub fn parse_input(input: &[u8]) -> Result<Vec<InputRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| EnricherError::parse(format!("spreadsheet header: {e}")))?;

    let column = headers
        .iter()
        .position(|h| {
            h.trim_start_matches('\u{feff}')
                .trim()
                .eq_ignore_ascii_case(URL_COLUMN)
        })
        .ok_or_else(|| {
            EnricherError::validation(format!("spreadsheet has no `{URL_COLUMN}` column"))
        })?;

    let mut records = Vec::new();
    for (position, row) in reader.records().enumerate() {
        let row = row.map_err(|e| EnricherError::parse(format!("row {}: {e}", position + 1)))?;
        records.push(InputRecord::new(position, row.get(column).unwrap_or_default()));
    }

    debug!(rows = records.len(), column, "parsed spreadsheet");
    Ok(records)
}

/// Project a merged company onto the output schema for one input row.
pub fn assemble(record: &InputRecord, company: MergedCompany) -> OutputRow {
    OutputRow {
        position: record.position,
        id: RowId::new(),
        source_url: record.source_url().to_string(),
        company,
    }
}

/// Write rows as CSV, sorted back into input order, every field quoted.
#[instrument(skip_all, fields(rows = rows.len()))]
pub fn serialize(rows: &[OutputRow]) -> Result<Vec<u8>> {
    let mut ordered: Vec<&OutputRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.position);

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer
        .write_record(OUTPUT_COLUMNS)
        .map_err(|e| EnricherError::Serialization(e.to_string()))?;
    for row in ordered {
        writer
            .write_record(row.fields())
            .map_err(|e| EnricherError::Serialization(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| EnricherError::Serialization(e.to_string()))
}
