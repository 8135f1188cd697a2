//! Effects produced by state transitions

use crate::chat::OutboundMessage;
use crate::commit::CommitKind;
use crate::store::StagingField;
use std::time::Duration;

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write one staging cell
    WriteField { field: StagingField, value: String },

    /// Blank the whole staging row (answers with `Event::StagingCleared`)
    ClearStaging,

    /// Read the staging row back (answers with `Event::StagingLoaded`)
    LoadStaging,

    /// Post a message into the session channel
    Send { message: OutboundMessage },

    /// Post a confirmation view, replacing the previous one
    ShowView { message: OutboundMessage },

    /// Delete the live confirmation view, if any
    RemoveView,

    /// Mint a transaction tag (answers with `Event::TransactionIdIssued`)
    IssueTransactionId,

    /// Run the finalize script (answers with `CommitSucceeded`/`CommitFailed`)
    InvokeCommit { kind: CommitKind },

    /// Deliver `Event::Timeout { epoch }` after `delay`
    ScheduleTimeout { epoch: u32, delay: Duration },
}

impl Effect {
    pub fn write(field: StagingField, value: impl Into<String>) -> Self {
        Effect::WriteField {
            field,
            value: value.into(),
        }
    }

    pub fn send(message: impl Into<OutboundMessage>) -> Self {
        Effect::Send {
            message: message.into(),
        }
    }
}
