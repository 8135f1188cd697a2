//! Session runtime and routing
//!
//! `SessionManager` owns the staging lease and the table of live sessions.
//! Inbound chat events are routed to the session they belong to, start a
//! new session, or are handled directly (retraction).

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::chat::{ChannelId, InboundInteraction, InboundMessage, OutboundMessage, UserId};
use crate::commit::TransactionIdGenerator;
use crate::dispatcher::{Dispatcher, Trigger};
use crate::names::NameResolver;
use crate::state_machine::state::{DEFAULT_CONFIRM_TIMEOUT, DEFAULT_PROMPT_TIMEOUT};
use crate::state_machine::{view, ActionId, Event, SessionContext};
use crate::store::find_committed;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

/// External collaborators shared by every session
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RowStore>,
    pub chat: Arc<dyn ChatClient>,
    pub commit: Arc<dyn CommitGateway>,
    pub ids: Arc<TransactionIdGenerator>,
}

/// Per-session knobs taken from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub sheet_url: String,
    pub confirm_timeout: Duration,
    pub prompt_timeout: Duration,
    pub clear_on_timeout: bool,
}

impl SessionSettings {
    pub fn new(sheet_url: impl Into<String>) -> Self {
        Self {
            sheet_url: sheet_url.into(),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
            clear_on_timeout: false,
        }
    }
}

/// Handle to interact with a running session
struct SessionHandle {
    initiator: UserId,
    channel: ChannelId,
    event_tx: mpsc::Sender<Event>,
}

/// What became of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Consumed by the sender's live session
    Routed { session_id: String },
    /// Started a new session
    Started { session_id: String },
    /// Trigger rejected because another session holds the staging row
    Busy,
    /// Command syntax with an unusable amount
    InvalidAmount,
    /// Not ours; left for ordinary command processing
    PassThrough,
}

/// What became of a button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    Routed { session_id: String },
    Expired,
    Retracted { row: u32 },
    RetractNotFound,
    RetractFailed,
    Ignored,
}

/// Manager for all ledger sessions
pub struct SessionManager {
    io: Collaborators,
    settings: SessionSettings,
    names: NameResolver,
    dispatcher: Dispatcher,
    /// The single staging row; a session holds it from trigger to terminal state
    staging: Arc<Mutex<()>>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        io: Collaborators,
        settings: SessionSettings,
        names: NameResolver,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            io,
            settings,
            names,
            dispatcher,
            staging: Arc::new(Mutex::new(())),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live sessions
    pub async fn live_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn handle_message(self: &Arc<Self>, message: InboundMessage) -> MessageOutcome {
        if let Some((session_id, event_tx)) = self
            .find_session(&message.author_id, &message.channel_id)
            .await
        {
            let event = Event::TextMessage {
                author: message.author_id.clone(),
                channel: message.channel_id.clone(),
                content: message.content.clone(),
            };
            if event_tx.send(event).await.is_ok() {
                return MessageOutcome::Routed { session_id };
            }
            // Session finished between lookup and send; treat as fresh input
            tracing::debug!(session_id = %session_id, "Session closed while routing message");
        }

        match self.dispatcher.classify(&message.content) {
            Trigger::Start { amount } => self.start_session(message, amount).await,
            Trigger::InvalidAmount => {
                self.reply(&message.channel_id, self.dispatcher.usage()).await;
                MessageOutcome::InvalidAmount
            }
            Trigger::None => MessageOutcome::PassThrough,
        }
    }

    pub async fn handle_interaction(&self, interaction: InboundInteraction) -> InteractionOutcome {
        match ActionId::parse(&interaction.custom_id) {
            None => InteractionOutcome::Ignored,
            Some(ActionId::Retract {
                channel,
                transaction_id,
            }) => {
                if channel != interaction.channel_id {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        committed_in = %channel,
                        pressed_in = %interaction.channel_id,
                        "Retraction pressed outside its channel"
                    );
                    return InteractionOutcome::Ignored;
                }
                self.retract(&interaction.channel_id, &transaction_id).await
            }
            Some(ActionId::View {
                session_id,
                generation,
                action,
            }) => {
                let event_tx = self
                    .sessions
                    .read()
                    .await
                    .get(&session_id)
                    .map(|h| h.event_tx.clone());
                let event = Event::ButtonPress {
                    author: interaction.author_id,
                    channel: interaction.channel_id.clone(),
                    generation,
                    action,
                };
                match event_tx {
                    Some(tx) if tx.send(event).await.is_ok() => {
                        InteractionOutcome::Routed { session_id }
                    }
                    _ => {
                        tracing::info!(session_id = %session_id, "Interaction on expired session");
                        self.reply(&interaction.channel_id, view::EXPIRED_INTERACTION)
                            .await;
                        InteractionOutcome::Expired
                    }
                }
            }
        }
    }

    /// Delete the first committed row tagged with `transaction_id`
    pub async fn retract(&self, channel: &ChannelId, transaction_id: &str) -> InteractionOutcome {
        let rows = match self.io.store.scan_committed_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(transaction_id = %transaction_id, error = %e, "Failed to scan committed rows");
                self.reply(channel, view::store_failed(&e.to_string())).await;
                return InteractionOutcome::RetractFailed;
            }
        };

        let Some(row) = find_committed(&rows, transaction_id) else {
            tracing::info!(transaction_id = %transaction_id, "No committed row to retract");
            self.reply(channel, view::retract_not_found(transaction_id)).await;
            return InteractionOutcome::RetractNotFound;
        };

        let index = row.index;
        if let Err(e) = self.io.store.delete_row(index).await {
            tracing::error!(transaction_id = %transaction_id, row = index, error = %e, "Failed to delete committed row");
            self.reply(channel, view::store_failed(&e.to_string())).await;
            return InteractionOutcome::RetractFailed;
        }

        tracing::info!(transaction_id = %transaction_id, row = index, "Committed row retracted");
        self.reply(channel, view::retracted(transaction_id)).await;
        InteractionOutcome::Retracted { row: index }
    }

    async fn start_session(self: &Arc<Self>, message: InboundMessage, amount: u64) -> MessageOutcome {
        let Ok(lease) = Arc::clone(&self.staging).try_lock_owned() else {
            tracing::info!(
                channel_id = %message.channel_id,
                user_id = %message.author_id,
                "Trigger rejected, staging row in use"
            );
            self.reply(&message.channel_id, view::STAGING_BUSY).await;
            return MessageOutcome::Busy;
        };

        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let context = SessionContext::new(
            &session_id,
            message.author_id.clone(),
            &message.author_name,
            self.names.resolve(&message.author_name),
            message.channel_id.clone(),
            &self.settings.sheet_url,
        )
        .with_timeouts(self.settings.confirm_timeout, self.settings.prompt_timeout)
        .with_clear_on_timeout(self.settings.clear_on_timeout);

        let (event_tx, event_rx) = mpsc::channel(32);
        let runtime = SessionRuntime::new(
            context,
            self.io.clone(),
            event_rx,
            event_tx.clone(),
            lease,
        );

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionHandle {
                initiator: message.author_id,
                channel: message.channel_id,
                event_tx: event_tx.clone(),
            },
        );

        // Buffered until the runtime starts receiving
        let _ = event_tx.send(Event::Triggered { amount }).await;

        let manager = Arc::clone(self);
        let id = session_id.clone();
        tokio::spawn(async move {
            runtime.run().await;
            manager.sessions.write().await.remove(&id);
        });

        MessageOutcome::Started { session_id }
    }

    async fn find_session(
        &self,
        author: &UserId,
        channel: &ChannelId,
    ) -> Option<(String, mpsc::Sender<Event>)> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|(_, h)| &h.initiator == author && &h.channel == channel)
            .map(|(id, h)| (id.clone(), h.event_tx.clone()))
    }

    async fn reply(&self, channel: &ChannelId, message: impl Into<OutboundMessage>) {
        if let Err(e) = self.io.chat.send_message(channel, &message.into()).await {
            tracing::warn!(channel_id = %channel, error = %e, "Failed to send reply");
        }
    }
}
