//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::chat::{ChannelId, ChatError, MessageId, OutboundMessage};
use crate::commit::{CommitError, CommitKind};
use crate::store::{CommittedRow, StagingField, StagingRow, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

/// Row-oriented access to the ledger sheet
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Write one staging cell
    async fn write_field(&self, field: StagingField, value: &str) -> Result<(), StoreError>;

    /// Read the staging row, parsing the amount
    async fn read_staging(&self) -> Result<StagingRow, StoreError>;

    /// Blank every staging cell
    async fn clear_staging(&self) -> Result<(), StoreError>;

    /// Rows from the first committed row down, top first
    async fn scan_committed_rows(&self) -> Result<Vec<CommittedRow>, StoreError>;

    /// Delete a sheet row (1-based)
    async fn delete_row(&self, index: u32) -> Result<(), StoreError>;
}

/// Outbound side of the chat platform
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message, returning its id
    async fn send_message(
        &self,
        channel: &ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId, ChatError>;

    /// Delete a message we posted
    async fn delete_message(&self, channel: &ChannelId, message: &MessageId) -> Result<(), ChatError>;
}

/// The external finalize action
#[async_trait]
pub trait CommitGateway: Send + Sync {
    async fn commit(&self, kind: CommitKind) -> Result<(), CommitError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: RowStore + ?Sized> RowStore for Arc<T> {
    async fn write_field(&self, field: StagingField, value: &str) -> Result<(), StoreError> {
        (**self).write_field(field, value).await
    }

    async fn read_staging(&self) -> Result<StagingRow, StoreError> {
        (**self).read_staging().await
    }

    async fn clear_staging(&self) -> Result<(), StoreError> {
        (**self).clear_staging().await
    }

    async fn scan_committed_rows(&self) -> Result<Vec<CommittedRow>, StoreError> {
        (**self).scan_committed_rows().await
    }

    async fn delete_row(&self, index: u32) -> Result<(), StoreError> {
        (**self).delete_row(index).await
    }
}

#[async_trait]
impl<T: ChatClient + ?Sized> ChatClient for Arc<T> {
    async fn send_message(
        &self,
        channel: &ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId, ChatError> {
        (**self).send_message(channel, message).await
    }

    async fn delete_message(&self, channel: &ChannelId, message: &MessageId) -> Result<(), ChatError> {
        (**self).delete_message(channel, message).await
    }
}

#[async_trait]
impl<T: CommitGateway + ?Sized> CommitGateway for Arc<T> {
    async fn commit(&self, kind: CommitKind) -> Result<(), CommitError> {
        (**self).commit(kind).await
    }
}
