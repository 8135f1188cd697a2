//! Staging row and committed rows of the ledger sheet
//!
//! Layout of the worksheet:
//! - row 5, columns A-E: staging row (A unused, B name, C amount, D purpose, E tag)
//! - row 9 onward: committed entries, tag in column E

mod sheets;

pub use sheets::SheetsRowStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 1-based row of the staging area
pub const STAGING_ROW: u32 = 5;

/// 1-based row where committed entries begin
pub const FIRST_COMMITTED_ROW: u32 = 9;

/// Amounts are bounded to this many digits at trigger time
pub const MAX_AMOUNT_DIGITS: usize = 10;

/// A writable cell of the staging row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingField {
    Name,
    Amount,
    Purpose,
    TransactionId,
}

impl StagingField {
    /// Column letter of the field
    pub fn column(self) -> char {
        match self {
            StagingField::Name => 'B',
            StagingField::Amount => 'C',
            StagingField::Purpose => 'D',
            StagingField::TransactionId => 'E',
        }
    }

    /// A1 reference of the field's staging cell, e.g. `C5`
    pub fn cell(self) -> String {
        format!("{}{STAGING_ROW}", self.column())
    }
}

/// Current contents of the staging row
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StagingRow {
    pub name: String,
    pub amount: u64,
    pub purpose: String,
    /// Empty until commit time
    pub transaction_id: String,
}

impl StagingRow {
    /// Build from raw cell text (columns B-E), parsing the amount
    pub fn from_cells(name: &str, amount: &str, purpose: &str, tag: &str) -> Result<Self, StoreError> {
        Ok(Self {
            name: name.to_string(),
            amount: parse_amount(amount)?,
            purpose: purpose.to_string(),
            transaction_id: tag.to_string(),
        })
    }
}

/// A row below the staging area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedRow {
    /// 1-based sheet row
    pub index: u32,
    /// Columns A-E as text; missing trailing cells are empty
    pub cells: Vec<String>,
}

impl CommittedRow {
    /// The transaction tag (column E)
    pub fn tag(&self) -> &str {
        self.cells.get(4).map_or("", String::as_str)
    }

    pub fn matches(&self, transaction_id: &str) -> bool {
        !transaction_id.is_empty() && self.tag().starts_with(transaction_id)
    }
}

/// First committed row tagged with `transaction_id`, scanning top-down
pub fn find_committed<'a>(rows: &'a [CommittedRow], transaction_id: &str) -> Option<&'a CommittedRow> {
    rows.iter()
        .filter(|row| row.matches(transaction_id))
        .min_by_key(|row| row.index)
}

/// Parse an amount cell. Surrounding whitespace and digit grouping commas are tolerated.
pub fn parse_amount(raw: &str) -> Result<u64, StoreError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::MalformedAmount(raw.to_string()));
    }
    cleaned
        .parse()
        .map_err(|_| StoreError::MalformedAmount(raw.to_string()))
}

/// Row store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sheet request failed: {0}")]
    Network(String),
    #[error("sheet API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("amount cell is not a number: {0:?}")]
    MalformedAmount(String),
    #[error("unexpected sheet response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            StoreError::MalformedAmount(_) | StoreError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Network(e.to_string())
        }
    }
}
