//! API request and response types

use crate::chat::{InboundInteraction, InboundMessage};
use serde::{Deserialize, Serialize};

/// Body of `POST /webhook` and `POST /notify`
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    /// Older senders post `message` instead
    #[serde(default, alias = "message")]
    pub content: Option<String>,
    #[serde(default)]
    pub sheet_url: Option<String>,
}

/// A chat event relayed from the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(InboundMessage),
    Interaction(InboundInteraction),
}

/// Response for the inbound bridge
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundResponse {
    /// Whether the ledger consumed the event
    pub handled: bool,
}
