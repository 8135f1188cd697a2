//! Discord REST adapter

use super::{Button, ButtonStyle, ButtonTarget, ChannelId, ChatError, MessageId, OutboundMessage};
use crate::runtime::ChatClient;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DISCORD_API: &str = "https://discord.com/api/v10";

/// JSON error code for an unknown channel
const UNKNOWN_CHANNEL: u32 = 10003;

/// Buttons per action row
const ROW_WIDTH: usize = 5;

pub struct DiscordRestClient {
    client: Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<ActionRow<'a>>,
}

#[derive(Debug, Serialize)]
struct ActionRow<'a> {
    #[serde(rename = "type")]
    kind: u8,
    components: Vec<ButtonComponent<'a>>,
}

#[derive(Debug, Serialize)]
struct ButtonComponent<'a> {
    #[serde(rename = "type")]
    kind: u8,
    style: u8,
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: u32,
}

impl DiscordRestClient {
    pub fn new(token: impl Into<String>) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            token: token.into(),
            base_url: DISCORD_API.to_string(),
        })
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }
}

#[async_trait]
impl ChatClient for DiscordRestClient {
    async fn send_message(
        &self,
        channel: &ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId, ChatError> {
        let url = format!("{}/channels/{channel}/messages", self.base_url);
        let response = self
            .client
            .post(url)
            .header("Authorization", self.auth())
            .json(&create_message(message))
            .send()
            .await?;

        let created: CreatedMessage = check(response, channel).await?.json().await?;
        tracing::debug!(channel_id = %channel, message_id = %created.id, "Message posted");
        Ok(MessageId::new(created.id))
    }

    async fn delete_message(&self, channel: &ChannelId, message: &MessageId) -> Result<(), ChatError> {
        let url = format!("{}/channels/{channel}/messages/{message}", self.base_url);
        let response = self
            .client
            .delete(url)
            .header("Authorization", self.auth())
            .send()
            .await?;
        check(response, channel).await?;
        Ok(())
    }
}

async fn check(response: Response, channel: &ChannelId) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_error(status.as_u16(), body, channel))
}

fn classify_error(status: u16, body: String, channel: &ChannelId) -> ChatError {
    let code = serde_json::from_str::<ApiError>(&body).ok().map(|e| e.code);
    if status == 404 && code == Some(UNKNOWN_CHANNEL) {
        ChatError::UnknownChannel(channel.clone())
    } else {
        ChatError::Api { status, body }
    }
}

fn create_message(message: &OutboundMessage) -> CreateMessage<'_> {
    CreateMessage {
        content: &message.content,
        components: message
            .buttons
            .chunks(ROW_WIDTH)
            .map(|row| ActionRow {
                kind: 1,
                components: row.iter().map(button_component).collect(),
            })
            .collect(),
    }
}

fn button_component(button: &Button) -> ButtonComponent<'_> {
    let (style, custom_id, url) = match &button.target {
        ButtonTarget::Custom { custom_id } => {
            let style = match button.style {
                ButtonStyle::Primary => 1,
                ButtonStyle::Secondary => 2,
                ButtonStyle::Danger => 4,
            };
            (style, Some(custom_id.as_str()), None)
        }
        ButtonTarget::Link { url } => (5, None, Some(url.as_str())),
    };
    ButtonComponent {
        kind: 2,
        style,
        label: &button.label,
        custom_id,
        url,
    }
}
