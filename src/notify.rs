//! Webhook notifications
//!
//! HTTP handlers never talk to the chat client directly. They hand a
//! `Notification` to the sink task through an mpsc channel and return.

use crate::chat::{Button, ChannelId, OutboundMessage};
use crate::runtime::ChatClient;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const LINK_LABEL: &str = "スプレッドシートを開く";

const QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub content: String,
    /// Rendered as a single link button
    pub link_url: Option<String>,
}

impl Notification {
    pub fn into_message(self) -> OutboundMessage {
        let message = OutboundMessage::text(self.content);
        match self.link_url {
            Some(url) => message.with_button(Button::link(LINK_LABEL, url)),
            None => message,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification sink has shut down")]
pub struct SinkClosed;

/// Cloneable handle used by request handlers
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<Notification>,
}

impl NotificationSender {
    pub async fn deliver(&self, notification: Notification) -> Result<(), SinkClosed> {
        self.tx.send(notification).await.map_err(|_| SinkClosed)
    }
}

/// Task posting queued notifications to the configured channel
pub struct NotificationSink {
    chat: Arc<dyn ChatClient>,
    channel: Option<ChannelId>,
    rx: mpsc::Receiver<Notification>,
}

impl NotificationSink {
    pub fn channel(chat: Arc<dyn ChatClient>, channel: Option<ChannelId>) -> (NotificationSender, Self) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        (NotificationSender { tx }, Self { chat, channel, rx })
    }

    /// Runs until every sender is dropped
    pub async fn run(mut self) {
        while let Some(notification) = self.rx.recv().await {
            self.post(notification).await;
        }
        tracing::debug!("Notification sink stopped");
    }

    async fn post(&self, notification: Notification) {
        let Some(channel) = &self.channel else {
            tracing::warn!(content = %notification.content, "No notification channel configured, dropping");
            return;
        };

        match self.chat.send_message(channel, &notification.into_message()).await {
            Ok(message_id) => {
                tracing::info!(channel_id = %channel, message_id = %message_id, "Notification delivered");
            }
            Err(e) => {
                tracing::warn!(channel_id = %channel, error = %e, "Notification dropped");
            }
        }
    }
}
