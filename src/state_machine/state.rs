//! Session state types

use crate::chat::{ChannelId, UserId};
use crate::commit::CommitKind;
use std::time::Duration;

/// Exact-match sentinel that cancels the session at any input point
pub const CANCEL_KEYWORD: &str = "キャンセル";

/// Default window for a decision on the confirmation view
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Default window for answering a text prompt
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Session state
///
/// Non-terminal states carry an `epoch` that increases on every prompt or
/// view. Timeouts and button presses name the epoch they belong to; anything
/// older than the current epoch is stale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LedgerState {
    /// Created, trigger not yet applied
    #[default]
    Start,

    /// Waiting for the free-text purpose
    AwaitingPurpose { epoch: u32 },

    /// Staging read in flight for a (re-)render of the confirmation view
    Rendering { epoch: u32 },

    /// Confirmation view with the given generation is live
    AwaitingConfirmation { epoch: u32 },

    /// Waiting for a replacement amount
    AwaitingAmountEdit { epoch: u32 },

    /// Waiting for a replacement purpose
    AwaitingPurposeEdit { epoch: u32 },

    /// Commit requested; tag not yet issued (`None`) or finalize call in flight
    Committing {
        epoch: u32,
        kind: CommitKind,
        transaction_id: Option<String>,
    },

    /// Staging clear in flight; ends in `then` once the store confirms
    Clearing { epoch: u32, then: ClearReason },

    /// Finalize call succeeded (terminal)
    Committed { transaction_id: String },

    /// User cancelled; staging cleared (terminal)
    Cancelled,

    /// No qualifying input in time (terminal)
    TimedOut,

    /// Staging could not be written or read (terminal)
    Failed { message: String },
}

impl LedgerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LedgerState::Committed { .. }
                | LedgerState::Cancelled
                | LedgerState::TimedOut
                | LedgerState::Failed { .. }
        )
    }

    /// Epoch of a live state; terminal states have none
    pub fn epoch(&self) -> Option<u32> {
        match self {
            LedgerState::Start => Some(0),
            LedgerState::AwaitingPurpose { epoch }
            | LedgerState::Rendering { epoch }
            | LedgerState::AwaitingConfirmation { epoch }
            | LedgerState::AwaitingAmountEdit { epoch }
            | LedgerState::AwaitingPurposeEdit { epoch }
            | LedgerState::Committing { epoch, .. }
            | LedgerState::Clearing { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            LedgerState::Start => "start",
            LedgerState::AwaitingPurpose { .. } => "awaiting_purpose",
            LedgerState::Rendering { .. } => "rendering",
            LedgerState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            LedgerState::AwaitingAmountEdit { .. } => "awaiting_amount_edit",
            LedgerState::AwaitingPurposeEdit { .. } => "awaiting_purpose_edit",
            LedgerState::Committing { .. } => "committing",
            LedgerState::Clearing { .. } => "clearing",
            LedgerState::Committed { .. } => "committed",
            LedgerState::Cancelled => "cancelled",
            LedgerState::TimedOut => "timed_out",
            LedgerState::Failed { .. } => "failed",
        }
    }
}

/// Why the staging row is being cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Cancelled,
    TimedOut,
}

impl ClearReason {
    /// Terminal state reached once staging is blank
    pub fn terminal(self) -> LedgerState {
        match self {
            ClearReason::Cancelled => LedgerState::Cancelled,
            ClearReason::TimedOut => LedgerState::TimedOut,
        }
    }
}

/// Immutable facts about one session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Only this user's input is consumed
    pub initiator: UserId,
    /// Display name, used when addressing the user
    pub initiator_name: String,
    /// Resolved name written to the ledger
    pub ledger_name: String,
    pub channel: ChannelId,
    /// Opened by the link button after a commit
    pub sheet_url: String,
    pub confirm_timeout: Duration,
    pub prompt_timeout: Duration,
    /// Blank the staging row when the session times out
    pub clear_on_timeout: bool,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        initiator: UserId,
        initiator_name: impl Into<String>,
        ledger_name: impl Into<String>,
        channel: ChannelId,
        sheet_url: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            initiator,
            initiator_name: initiator_name.into(),
            ledger_name: ledger_name.into(),
            channel,
            sheet_url: sheet_url.into(),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
            clear_on_timeout: false,
        }
    }

    pub fn with_timeouts(mut self, confirm: Duration, prompt: Duration) -> Self {
        self.confirm_timeout = confirm;
        self.prompt_timeout = prompt;
        self
    }

    pub fn with_clear_on_timeout(mut self, clear: bool) -> Self {
        self.clear_on_timeout = clear;
        self
    }

    /// Whether input from `author` in `channel` belongs to this session
    pub fn accepts(&self, author: &UserId, channel: &ChannelId) -> bool {
        &self.initiator == author && &self.channel == channel
    }
}
