//! Chat platform value types
//!
//! The gateway protocol itself lives outside this crate. Inbound events
//! arrive already decoded (see `api`), outbound traffic goes through the
//! `ChatClient` trait (see `runtime::traits`).

mod discord;

pub use discord::DiscordRestClient;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

snowflake!(
    /// Conversation channel
    ChannelId
);
snowflake!(
    /// Chat user
    UserId
);
snowflake!(
    /// A message posted in a channel
    MessageId
);

/// A text message posted by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    /// Display name as shown in the guild
    pub author_name: String,
    pub content: String,
}

/// A button press on a message we rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundInteraction {
    pub channel_id: ChannelId,
    /// The message carrying the pressed button
    pub message_id: MessageId,
    pub author_id: UserId,
    pub custom_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

/// What a button does when pressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ButtonTarget {
    /// Routed back to us as an interaction with this id
    Custom { custom_id: String },
    /// Opens a URL in the client, never routed back
    Link { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub style: ButtonStyle,
    pub target: ButtonTarget,
}

impl Button {
    pub fn action(label: impl Into<String>, style: ButtonStyle, custom_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            style,
            target: ButtonTarget::Custom {
                custom_id: custom_id.into(),
            },
        }
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            style: ButtonStyle::Secondary,
            target: ButtonTarget::Link { url: url.into() },
        }
    }
}

/// Message we post into a channel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }
}

impl From<String> for OutboundMessage {
    fn from(content: String) -> Self {
        OutboundMessage::text(content)
    }
}

impl From<&str> for OutboundMessage {
    fn from(content: &str) -> Self {
        OutboundMessage::text(content)
    }
}

/// Chat REST failure
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Network(String),
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    #[error("chat API returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Network(_) => true,
            ChatError::UnknownChannel(_) => false,
            ChatError::Api { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Network(e.to_string())
    }
}
