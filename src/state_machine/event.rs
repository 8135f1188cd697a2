//! Inputs to the session state machine

use crate::chat::{ChannelId, UserId};
use crate::commit::CommitKind;
use crate::store::StagingRow;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Dispatcher
    Triggered {
        amount: u64,
    },

    // User input
    TextMessage {
        author: UserId,
        channel: ChannelId,
        content: String,
    },
    ButtonPress {
        author: UserId,
        channel: ChannelId,
        generation: u32,
        action: ViewAction,
    },

    // Timer
    Timeout {
        epoch: u32,
    },

    // Effect feedback
    StagingLoaded {
        result: Result<StagingRow, LoadFailure>,
    },
    StagingCleared,
    /// The confirmation view could not be posted
    ViewFailed {
        message: String,
    },
    TransactionIdIssued {
        transaction_id: String,
    },
    CommitSucceeded,
    CommitFailed {
        message: String,
        retryable: bool,
    },
    StoreFailed {
        message: String,
    },
}

impl Event {
    /// Feedback that aborts the rest of the current effect batch
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::StoreFailed { .. }
                | Event::CommitFailed { .. }
                | Event::ViewFailed { .. }
                | Event::StagingLoaded { result: Err(_) }
        )
    }
}

/// Why a staging read did not produce a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    /// The amount cell holds something that is not a number
    MalformedAmount(String),
    /// The store could not be read at all
    Unavailable(String),
}

/// A button on the confirmation view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewAction {
    EditAmount,
    EditPurpose,
    Commit(CommitKind),
}

impl ViewAction {
    fn token(self) -> &'static str {
        match self {
            ViewAction::EditAmount => "amount",
            ViewAction::EditPurpose => "purpose",
            ViewAction::Commit(CommitKind::OneRow) => "commit",
            ViewAction::Commit(CommitKind::AllRows) => "commit_all",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "amount" => Some(ViewAction::EditAmount),
            "purpose" => Some(ViewAction::EditPurpose),
            "commit" => Some(ViewAction::Commit(CommitKind::OneRow)),
            "commit_all" => Some(ViewAction::Commit(CommitKind::AllRows)),
            _ => None,
        }
    }
}

const ACTION_PREFIX: &str = "ledger";
const RETRACT_TOKEN: &str = "retract";

/// Decoded button custom id
///
/// Encodings:
/// - `ledger:<session>:<generation>:<action>` for confirmation view buttons
/// - `ledger:retract:<channel>:<transaction id>` for the post-commit retraction button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionId {
    View {
        session_id: String,
        generation: u32,
        action: ViewAction,
    },
    Retract {
        /// Channel the entry was committed from
        channel: ChannelId,
        transaction_id: String,
    },
}

impl ActionId {
    pub fn view(session_id: impl Into<String>, generation: u32, action: ViewAction) -> Self {
        ActionId::View {
            session_id: session_id.into(),
            generation,
            action,
        }
    }

    pub fn retract(channel: ChannelId, transaction_id: impl Into<String>) -> Self {
        ActionId::Retract {
            channel,
            transaction_id: transaction_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ActionId::View {
                session_id,
                generation,
                action,
            } => format!("{ACTION_PREFIX}:{session_id}:{generation}:{}", action.token()),
            ActionId::Retract {
                channel,
                transaction_id,
            } => format!("{ACTION_PREFIX}:{RETRACT_TOKEN}:{channel}:{transaction_id}"),
        }
    }

    /// `None` for ids we did not mint
    pub fn parse(custom_id: &str) -> Option<Self> {
        let mut parts = custom_id.split(':');
        if parts.next()? != ACTION_PREFIX {
            return None;
        }
        let second = parts.next()?;
        if second == RETRACT_TOKEN {
            let channel = parts.next()?;
            let transaction_id = parts.next()?;
            if channel.is_empty() || transaction_id.is_empty() || parts.next().is_some() {
                return None;
            }
            return Some(ActionId::retract(ChannelId::new(channel), transaction_id));
        }
        let generation = parts.next()?.parse().ok()?;
        let action = ViewAction::from_token(parts.next()?)?;
        if second.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(ActionId::view(second, generation, action))
    }
}
