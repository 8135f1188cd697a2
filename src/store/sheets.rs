//! Google Sheets v4 row store

use super::{
    parse_amount, CommittedRow, StagingField, StagingRow, StoreError, FIRST_COMMITTED_ROW,
    STAGING_ROW,
};
use crate::runtime::RowStore;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Row store backed by one worksheet of a spreadsheet
pub struct SheetsRowStore {
    client: Client,
    access_token: String,
    spreadsheet_id: String,
    sheet_name: String,
    sheet_gid: u32,
}

/// Body of the values endpoints
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    major_dimension: Option<String>,
    /// Absent when the range is empty; trailing blank cells are omitted
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsRowStore {
    pub fn new(
        access_token: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        sheet_gid: u32,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            access_token: access_token.into(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            sheet_gid,
        })
    }

    /// Browser link to the worksheet
    pub fn sheet_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/edit#gid={}",
            self.spreadsheet_id, self.sheet_gid
        )
    }

    /// `.../values/<range><suffix>` with the range percent-encoded as one segment
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&format!("{SHEETS_API}/{}/values", self.spreadsheet_id))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::Decode("spreadsheet url cannot take a path".to_string()))?
            .push(&format!("{}{suffix}", a1_range(&self.sheet_name, range)));
        Ok(url)
    }

    async fn get_values(&self, range: &str) -> Result<ValueRange, StoreError> {
        let mut url = self.values_url(range, "")?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

#[async_trait]
impl RowStore for SheetsRowStore {
    async fn write_field(&self, field: StagingField, value: &str) -> Result<(), StoreError> {
        let range = field.cell();
        let mut url = self.values_url(&range, "")?;
        // User text is stored verbatim, never parsed as a formula or date
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&write_request(&self.sheet_name, field, value))
            .send()
            .await?;
        check(response).await?;

        tracing::debug!(cell = %range, "Staging cell written");
        Ok(())
    }

    async fn read_staging(&self) -> Result<StagingRow, StoreError> {
        let values = self.get_values(&staging_range()).await?;
        parse_staging(&values)
    }

    async fn clear_staging(&self) -> Result<(), StoreError> {
        let url = self.values_url(&staging_range(), ":clear")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await?;
        check(response).await?;

        tracing::debug!("Staging row cleared");
        Ok(())
    }

    async fn scan_committed_rows(&self) -> Result<Vec<CommittedRow>, StoreError> {
        let values = self
            .get_values(&format!("A{FIRST_COMMITTED_ROW}:E"))
            .await?;
        Ok(parse_committed(&values))
    }

    async fn delete_row(&self, index: u32) -> Result<(), StoreError> {
        let url = format!("{SHEETS_API}/{}:batchUpdate", self.spreadsheet_id);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&delete_row_request(self.sheet_gid, index))
            .send()
            .await?;
        check(response).await?;

        tracing::info!(row = index, "Sheet row deleted");
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        body,
    })
}

fn staging_range() -> String {
    format!("A{STAGING_ROW}:E{STAGING_ROW}")
}

/// `'Sheet Name'!A5:E5`, quotes in the title doubled
fn a1_range(sheet_name: &str, range: &str) -> String {
    format!("'{}'!{range}", sheet_name.replace('\'', "''"))
}

/// Body of a single-cell write
fn write_request(sheet_name: &str, field: StagingField, value: &str) -> ValueRange {
    ValueRange {
        range: Some(a1_range(sheet_name, &field.cell())),
        major_dimension: Some("ROWS".to_string()),
        values: vec![vec![cell_value(field, value)]],
    }
}

/// Numeric amounts go in as numbers so the finalize script can sum them
fn cell_value(field: StagingField, value: &str) -> Value {
    match (field, parse_amount(value)) {
        (StagingField::Amount, Ok(amount)) => Value::from(amount),
        _ => Value::String(value.to_string()),
    }
}

/// Display text of a cell as returned with `UNFORMATTED_VALUE`
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_u64()
            .map_or_else(|| n.to_string(), |whole| whole.to_string()),
        other => other.to_string(),
    }
}

/// Staging row from the `A5:E5` range; column A is ignored
fn parse_staging(values: &ValueRange) -> Result<StagingRow, StoreError> {
    let row = values.values.first().map_or(&[][..], Vec::as_slice);
    let text = |column: usize| row.get(column).map(cell_text).unwrap_or_default();
    StagingRow::from_cells(&text(1), &text(2), &text(3), &text(4))
}

/// Committed rows from the `A9:E` range, numbered from the first committed row
fn parse_committed(values: &ValueRange) -> Vec<CommittedRow> {
    (FIRST_COMMITTED_ROW..)
        .zip(&values.values)
        .map(|(index, row)| CommittedRow {
            index,
            cells: row.iter().map(cell_text).collect(),
        })
        .collect()
}

/// `batchUpdate` body deleting 1-based `row` of the worksheet
fn delete_row_request(sheet_gid: u32, row: u32) -> Value {
    json!({
        "requests": [{
            "deleteDimension": {
                "range": {
                    "sheetId": sheet_gid,
                    "dimension": "ROWS",
                    "startIndex": row - 1,
                    "endIndex": row,
                }
            }
        }]
    })
}
