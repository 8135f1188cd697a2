//! Commit gateway: the external finalize script
//!
//! The script appends the staged entry (or every staged entry) to the
//! permanent ledger. We only trigger it; the appended rows are its business.

use crate::runtime::CommitGateway;
use async_trait::async_trait;
use chrono::Local;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Which finalize action to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    /// Commit the staged row only
    OneRow,
    /// Commit every staged row
    AllRows,
}

impl CommitKind {
    /// Value of the script's `action` query parameter
    pub fn action(self) -> &'static str {
        match self {
            CommitKind::OneRow => "confirm",
            CommitKind::AllRows => "all_confirm",
        }
    }
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("finalize script unreachable: {0}")]
    Network(String),
    #[error("finalize script returned {status}")]
    Status { status: u16 },
}

impl CommitError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CommitError::Network(_) => true,
            CommitError::Status { status } => *status == 429 || *status >= 500,
        }
    }
}

impl From<reqwest::Error> for CommitError {
    fn from(e: reqwest::Error) -> Self {
        CommitError::Network(e.to_string())
    }
}

/// Calls the finalize script with `GET <base>?action=<confirm|all_confirm>`
pub struct ScriptCommitGateway {
    client: Client,
    base_url: String,
}

impl ScriptCommitGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CommitError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, kind: CommitKind) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}action={}", self.base_url, kind.action())
    }
}

#[async_trait]
impl CommitGateway for ScriptCommitGateway {
    async fn commit(&self, kind: CommitKind) -> Result<(), CommitError> {
        let url = self.url_for(kind);
        let start = std::time::Instant::now();
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        tracing::info!(
            action = kind.action(),
            status = status.as_u16(),
            duration_ms = %start.elapsed().as_millis(),
            "Finalize script invoked"
        );

        if status.is_success() {
            Ok(())
        } else {
            Err(CommitError::Status {
                status: status.as_u16(),
            })
        }
    }
}

/// Issues transaction tags: local timestamp, process sequence, random suffix
///
/// The sequence makes tags unique within a process lifetime; the suffix keeps
/// tags from different processes started in the same second apart.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    sequence: AtomicU64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 10_000;
        let suffix: u16 = rand::thread_rng().gen();
        format!("{}-{seq:04}{suffix:04x}", Local::now().format("%Y%m%d%H%M%S"))
    }
}
