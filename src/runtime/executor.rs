//! Session runtime executor

use super::Collaborators;
use crate::chat::MessageId;
use crate::state_machine::{
    transition, view, Effect, Event, LedgerState, LoadFailure, SessionContext, TransitionError,
};
use crate::store::StoreError;
use std::collections::VecDeque;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;

/// Exclusive right to the staging row, released on drop
pub type StagingLease = OwnedMutexGuard<()>;

/// Owns one session: its state, its live view and its timers.
///
/// Events are processed one at a time, so transitions of a session never
/// interleave. The staging lease is held for the whole lifetime.
pub struct SessionRuntime {
    context: SessionContext,
    state: LedgerState,
    io: Collaborators,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    /// The confirmation view currently shown
    live_view: Option<MessageId>,
    timers: Vec<JoinHandle<()>>,
    _lease: StagingLease,
}

impl SessionRuntime {
    pub fn new(
        context: SessionContext,
        io: Collaborators,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        lease: StagingLease,
    ) -> Self {
        Self {
            context,
            state: LedgerState::Start,
            io,
            event_rx,
            event_tx,
            live_view: None,
            timers: Vec::new(),
            _lease: lease,
        }
    }

    /// Run until the session reaches a terminal state; returns that state
    pub async fn run(mut self) -> LedgerState {
        tracing::info!(
            session_id = %self.context.session_id,
            channel_id = %self.context.channel,
            user_id = %self.context.initiator,
            "Starting ledger session"
        );

        while let Some(event) = self.event_rx.recv().await {
            self.process_event(event).await;
            if self.state.is_terminal() {
                break;
            }
        }

        for timer in self.timers.drain(..) {
            timer.abort();
        }

        match &self.state {
            LedgerState::Committed { transaction_id } => tracing::info!(
                session_id = %self.context.session_id,
                transaction_id = %transaction_id,
                "Ledger session committed"
            ),
            LedgerState::Failed { message } => tracing::warn!(
                session_id = %self.context.session_id,
                error = %message,
                "Ledger session failed"
            ),
            other => tracing::info!(
                session_id = %self.context.session_id,
                state = other.name(),
                "Ledger session ended"
            ),
        }

        std::mem::take(&mut self.state)
    }

    async fn process_event(&mut self, event: Event) {
        // Chained effects produce more events; handle them in order
        let mut pending = VecDeque::from([event]);

        while let Some(current) = pending.pop_front() {
            let is_press = matches!(current, Event::ButtonPress { .. });

            let result = match transition(&self.state, &self.context, current) {
                Ok(r) => r,
                Err(e) => {
                    self.report_rejection(&e, is_press).await;
                    return;
                }
            };

            let old_state = std::mem::replace(&mut self.state, result.new_state);
            if old_state != self.state {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    from = old_state.name(),
                    to = self.state.name(),
                    "State transition"
                );
            }

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(effect).await {
                    // A failed effect invalidates the rest of the batch
                    let abort = generated.is_failure();
                    pending.push_back(generated);
                    if abort {
                        break;
                    }
                }
            }
        }
    }

    async fn report_rejection(&self, error: &TransitionError, is_press: bool) {
        let reply = match error {
            TransitionError::NotInitiator => Some(view::NOT_INITIATOR),
            TransitionError::StaleView => Some(view::EXPIRED_INTERACTION),
            TransitionError::SessionEnded if is_press => Some(view::EXPIRED_INTERACTION),
            TransitionError::ForeignInput | TransitionError::StaleTimeout => None,
            TransitionError::SessionEnded | TransitionError::InvalidTransition(_) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    state = self.state.name(),
                    error = %error,
                    "Event rejected"
                );
                None
            }
        };

        if let Some(text) = reply {
            self.send(text.into()).await;
        }
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::WriteField { field, value } => {
                let result = self.io.store.write_field(field, &value).await;
                self.store_outcome(result, "write staging field")
            }

            Effect::ClearStaging => {
                let result = self.io.store.clear_staging().await;
                self.store_outcome(result, "clear staging")
                    .or(Some(Event::StagingCleared))
            }

            Effect::LoadStaging => {
                let result = match self.io.store.read_staging().await {
                    Ok(row) => Ok(row),
                    Err(StoreError::MalformedAmount(raw)) => {
                        tracing::warn!(
                            session_id = %self.context.session_id,
                            raw = %raw,
                            "Staging amount is not numeric"
                        );
                        Err(LoadFailure::MalformedAmount(raw))
                    }
                    Err(e) => {
                        tracing::error!(session_id = %self.context.session_id, error = %e, "Failed to read staging");
                        Err(LoadFailure::Unavailable(e.to_string()))
                    }
                };
                Some(Event::StagingLoaded { result })
            }

            Effect::Send { message } => {
                self.send(message).await;
                None
            }

            Effect::ShowView { message } => {
                self.remove_view().await;
                match self
                    .io
                    .chat
                    .send_message(&self.context.channel, &message)
                    .await
                {
                    Ok(id) => {
                        self.live_view = Some(id);
                        None
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = %self.context.session_id,
                            error = %e,
                            "Failed to post confirmation view"
                        );
                        Some(Event::ViewFailed {
                            message: e.to_string(),
                        })
                    }
                }
            }

            Effect::RemoveView => {
                self.remove_view().await;
                None
            }

            Effect::IssueTransactionId => Some(Event::TransactionIdIssued {
                transaction_id: self.io.ids.next_id(),
            }),

            Effect::InvokeCommit { kind } => match self.io.commit.commit(kind).await {
                Ok(()) => Some(Event::CommitSucceeded),
                Err(e) => {
                    tracing::error!(
                        session_id = %self.context.session_id,
                        action = kind.action(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "Finalize script failed"
                    );
                    Some(Event::CommitFailed {
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    })
                }
            },

            Effect::ScheduleTimeout { epoch, delay } => {
                let event_tx = self.event_tx.clone();
                self.timers.push(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = event_tx.send(Event::Timeout { epoch }).await;
                }));
                None
            }
        }
    }

    fn store_outcome(&self, result: Result<(), StoreError>, op: &str) -> Option<Event> {
        match result {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    session_id = %self.context.session_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Failed to {op}"
                );
                Some(Event::StoreFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn send(&self, message: crate::chat::OutboundMessage) {
        if let Err(e) = self
            .io
            .chat
            .send_message(&self.context.channel, &message)
            .await
        {
            tracing::warn!(session_id = %self.context.session_id, error = %e, "Failed to send message");
        }
    }

    async fn remove_view(&mut self) {
        if let Some(view_id) = self.live_view.take() {
            if let Err(e) = self
                .io
                .chat
                .delete_message(&self.context.channel, &view_id)
                .await
            {
                tracing::debug!(session_id = %self.context.session_id, error = %e, "Failed to remove view");
            }
        }
    }
}
