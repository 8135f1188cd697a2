//! Pure state transition function
//!
//! Given the same state, context and event it always produces the same
//! result. All I/O is described by the returned effects.

use super::event::{LoadFailure, ViewAction};
use super::state::{ClearReason, CANCEL_KEYWORD};
use super::view;
use super::{Effect, Event, LedgerState, SessionContext};
use crate::store::StagingField;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: LedgerState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: LedgerState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition. None of them change the state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Input from another user or channel")]
    ForeignInput,
    #[error("Only the initiator may operate this entry")]
    NotInitiator,
    #[error("Interaction refers to a view that is no longer live")]
    StaleView,
    #[error("Timer belongs to an earlier prompt")]
    StaleTimeout,
    #[error("Session already ended")]
    SessionEnded,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
#[allow(clippy::too_many_lines)] // One arm per edge of the dialogue
pub fn transition(
    state: &LedgerState,
    ctx: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::SessionEnded);
    }

    match (state, event) {
        // ============================================================
        // Trigger
        // ============================================================
        (LedgerState::Start, Event::Triggered { amount }) => {
            Ok(TransitionResult::new(LedgerState::AwaitingPurpose { epoch: 1 })
                .with_effect(Effect::write(StagingField::Name, ctx.ledger_name.clone()))
                .with_effect(Effect::write(StagingField::Amount, amount.to_string()))
                .with_effect(Effect::write(StagingField::TransactionId, ""))
                .with_effect(Effect::send(view::purpose_prompt(ctx)))
                .with_effect(prompt_timeout(ctx, 1)))
        }

        // ============================================================
        // Input ownership
        // ============================================================
        (_, Event::TextMessage { author, channel, .. }) if !ctx.accepts(&author, &channel) => {
            Err(TransitionError::ForeignInput)
        }
        (_, Event::ButtonPress { author, channel, .. }) if !ctx.accepts(&author, &channel) => {
            Err(TransitionError::NotInitiator)
        }

        // ============================================================
        // Cancellation at any input point
        // ============================================================
        (
            LedgerState::AwaitingPurpose { epoch }
            | LedgerState::AwaitingConfirmation { epoch }
            | LedgerState::AwaitingAmountEdit { epoch }
            | LedgerState::AwaitingPurposeEdit { epoch },
            Event::TextMessage { content, .. },
        ) if content == CANCEL_KEYWORD => Ok(clear(*epoch, ClearReason::Cancelled)),

        // The acknowledgement waits for the store; a failed clear lands in
        // the `StoreFailed` arm instead
        (LedgerState::Clearing { then, .. }, Event::StagingCleared) => {
            let result = TransitionResult::new(then.terminal());
            match then {
                ClearReason::Cancelled => Ok(result.with_effect(Effect::send(view::CANCELLED))),
                ClearReason::TimedOut => Ok(result),
            }
        }

        // ============================================================
        // Text answers
        // ============================================================
        (LedgerState::AwaitingPurpose { epoch }, Event::TextMessage { content, .. })
        | (LedgerState::AwaitingPurposeEdit { epoch }, Event::TextMessage { content, .. }) => {
            Ok(TransitionResult::new(LedgerState::Rendering { epoch: *epoch })
                .with_effect(Effect::write(StagingField::Purpose, content))
                .with_effect(Effect::LoadStaging))
        }

        // Raw text goes into the amount cell unvalidated; a non-numeric
        // value is caught by the staging read that follows.
        (LedgerState::AwaitingAmountEdit { epoch }, Event::TextMessage { content, .. }) => {
            Ok(TransitionResult::new(LedgerState::Rendering { epoch: *epoch })
                .with_effect(Effect::write(StagingField::Amount, content))
                .with_effect(Effect::LoadStaging))
        }

        // Chatter while the view is up is not consumed
        (LedgerState::AwaitingConfirmation { .. }, Event::TextMessage { .. }) => {
            Ok(TransitionResult::new(state.clone()))
        }

        // ============================================================
        // Rendering the confirmation view
        // ============================================================
        (LedgerState::Rendering { epoch }, Event::StagingLoaded { result: Ok(row) }) => {
            let next = epoch + 1;
            Ok(TransitionResult::new(LedgerState::AwaitingConfirmation { epoch: next })
                .with_effect(Effect::ShowView {
                    message: view::confirmation(ctx, &row, next),
                })
                .with_effect(Effect::ScheduleTimeout {
                    epoch: next,
                    delay: ctx.confirm_timeout,
                }))
        }

        (
            LedgerState::Rendering { epoch },
            Event::StagingLoaded {
                result: Err(LoadFailure::MalformedAmount(raw)),
            },
        ) => {
            let next = epoch + 1;
            Ok(TransitionResult::new(LedgerState::AwaitingAmountEdit { epoch: next })
                .with_effect(Effect::send(view::malformed_amount(&raw)))
                .with_effect(prompt_timeout(ctx, next)))
        }

        (
            LedgerState::Rendering { .. },
            Event::StagingLoaded {
                result: Err(LoadFailure::Unavailable(message)),
            },
        ) => Ok(fail(message)),

        // ============================================================
        // Confirmation view actions
        // ============================================================
        (
            LedgerState::AwaitingConfirmation { epoch },
            Event::ButtonPress {
                generation, action, ..
            },
        ) => {
            if generation != *epoch {
                return Err(TransitionError::StaleView);
            }
            let next = epoch + 1;
            match action {
                ViewAction::EditAmount => {
                    Ok(TransitionResult::new(LedgerState::AwaitingAmountEdit { epoch: next })
                        .with_effect(Effect::send(view::amount_edit_prompt()))
                        .with_effect(prompt_timeout(ctx, next)))
                }
                ViewAction::EditPurpose => {
                    Ok(TransitionResult::new(LedgerState::AwaitingPurposeEdit { epoch: next })
                        .with_effect(Effect::send(view::purpose_edit_prompt()))
                        .with_effect(prompt_timeout(ctx, next)))
                }
                ViewAction::Commit(kind) => Ok(TransitionResult::new(LedgerState::Committing {
                    epoch: next,
                    kind,
                    transaction_id: None,
                })
                .with_effect(Effect::IssueTransactionId)),
            }
        }

        // Buttons pressed anywhere else belong to a view that is gone
        (_, Event::ButtonPress { .. }) => Err(TransitionError::StaleView),

        // The chat service refused the view; ask for a shorter purpose
        (LedgerState::AwaitingConfirmation { epoch }, Event::ViewFailed { message }) => {
            let next = epoch + 1;
            Ok(TransitionResult::new(LedgerState::AwaitingPurposeEdit { epoch: next })
                .with_effect(Effect::send(view::view_failed(&message)))
                .with_effect(prompt_timeout(ctx, next)))
        }

        // ============================================================
        // Commit
        // ============================================================
        (
            LedgerState::Committing {
                epoch,
                kind,
                transaction_id: None,
            },
            Event::TransactionIdIssued { transaction_id },
        ) => Ok(TransitionResult::new(LedgerState::Committing {
            epoch: *epoch,
            kind: *kind,
            transaction_id: Some(transaction_id.clone()),
        })
        .with_effect(Effect::write(StagingField::TransactionId, transaction_id))
        .with_effect(Effect::InvokeCommit { kind: *kind })),

        (
            LedgerState::Committing {
                kind,
                transaction_id: Some(transaction_id),
                ..
            },
            Event::CommitSucceeded,
        ) => Ok(TransitionResult::new(LedgerState::Committed {
            transaction_id: transaction_id.clone(),
        })
        .with_effect(Effect::RemoveView)
        .with_effect(Effect::Send {
            message: view::committed(ctx, *kind, transaction_id),
        })),

        // Re-render so the user can try again from a fresh view
        (
            LedgerState::Committing { epoch, .. },
            Event::CommitFailed { message, retryable },
        ) => Ok(TransitionResult::new(LedgerState::Rendering { epoch: *epoch })
            .with_effect(Effect::send(view::commit_failed(&message, retryable)))
            .with_effect(Effect::LoadStaging)),

        // ============================================================
        // Timeouts
        // ============================================================
        (
            LedgerState::AwaitingPurpose { epoch }
            | LedgerState::AwaitingConfirmation { epoch }
            | LedgerState::AwaitingAmountEdit { epoch }
            | LedgerState::AwaitingPurposeEdit { epoch },
            Event::Timeout { epoch: fired },
        ) => {
            if fired != *epoch {
                return Err(TransitionError::StaleTimeout);
            }
            if ctx.clear_on_timeout {
                Ok(clear(*epoch, ClearReason::TimedOut))
            } else {
                Ok(TransitionResult::new(LedgerState::TimedOut))
            }
        }

        (_, Event::Timeout { .. }) => Err(TransitionError::StaleTimeout),

        // ============================================================
        // Store failures end the session
        // ============================================================
        (_, Event::StoreFailed { message }) => Ok(fail(message)),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{} cannot handle {event:?}",
            state.name()
        ))),
    }
}

fn prompt_timeout(ctx: &SessionContext, epoch: u32) -> Effect {
    Effect::ScheduleTimeout {
        epoch,
        delay: ctx.prompt_timeout,
    }
}

fn clear(epoch: u32, then: ClearReason) -> TransitionResult {
    TransitionResult::new(LedgerState::Clearing {
        epoch: epoch + 1,
        then,
    })
    .with_effect(Effect::ClearStaging)
}

fn fail(message: String) -> TransitionResult {
    TransitionResult::new(LedgerState::Failed {
        message: message.clone(),
    })
    .with_effect(Effect::send(view::store_failed(&message)))
}
