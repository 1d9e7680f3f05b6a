use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::messaging::{DeliveryError, Embed, Messenger, OutgoingMessage, SignupView};

/// Discord JSON error codes we distinguish.
const UNKNOWN_CHANNEL: i64 = 10003;
const UNKNOWN_MESSAGE: i64 = 10008;

/// [`Messenger`] backed by the Discord REST API (v10) with a bot token.
#[derive(Clone)]
pub struct DiscordService {
    client: reqwest::Client,
    bot_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordEmbed {
    pub title: Option<String>,
    pub color: Option<u32>,
    pub footer: Option<EmbedFooter>,
    pub fields: Option<Vec<EmbedField>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Body for create/edit message. Empty `embeds`/`components` clear them on edit.
#[derive(Debug, Clone, Serialize)]
pub struct DiscordMessage {
    pub content: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
    pub components: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatedMessage {
    id: String,
}

impl From<&Embed> for DiscordEmbed {
    fn from(embed: &Embed) -> Self {
        DiscordEmbed {
            title: Some(embed.title.clone()),
            color: embed.color,
            footer: embed.footer.as_ref().map(|text| EmbedFooter { text: text.clone() }),
            fields: Some(
                embed
                    .fields
                    .iter()
                    .map(|f| EmbedField {
                        name: f.name.clone(),
                        value: f.value.clone(),
                        inline: f.inline,
                    })
                    .collect(),
            ),
        }
    }
}

/// Role select (string select menu, max 25 options) plus a leave button.
fn view_components(view: &SignupView) -> Vec<Value> {
    let mut rows = Vec::new();

    let options: Vec<Value> = view
        .roles
        .iter()
        .filter(|(_, capacity)| *capacity > 0)
        .take(25)
        .map(|(name, capacity)| {
            serde_json::json!({
                "label": name,
                "value": name,
                "description": format!("Limit {}", capacity),
            })
        })
        .collect();
    if !options.is_empty() {
        rows.push(serde_json::json!({
            "type": 1,
            "components": [{
                "type": 3,
                "custom_id": view.select_id(),
                "placeholder": "Pick a role to sign up",
                "min_values": 1,
                "max_values": 1,
                "options": options,
            }]
        }));
    }

    rows.push(serde_json::json!({
        "type": 1,
        "components": [{
            "type": 2,
            "style": 2,
            "label": "Leave",
            "custom_id": view.leave_id(),
        }]
    }));

    rows
}

impl From<&OutgoingMessage> for DiscordMessage {
    fn from(message: &OutgoingMessage) -> Self {
        DiscordMessage {
            content: message.content.clone(),
            embeds: message.embed.iter().map(DiscordEmbed::from).collect(),
            components: message.view.as_ref().map(view_components).unwrap_or_default(),
        }
    }
}

impl DiscordService {
    pub fn new(bot_token: String) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DeliveryError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, bot_token })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("https://discord.com/api/v10{}", endpoint)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Parse retry_after from a Discord rate limit error response
    fn parse_retry_after(error_text: &str) -> Option<f64> {
        serde_json::from_str::<Value>(error_text)
            .ok()
            .and_then(|json| json.get("retry_after").and_then(|v| v.as_f64()))
    }

    fn parse_error_code(error_text: &str) -> Option<i64> {
        serde_json::from_str::<Value>(error_text)
            .ok()
            .and_then(|json| json.get("code").and_then(|v| v.as_i64()))
    }

    /// Map a failed response to a [`DeliveryError`].
    fn classify(status: reqwest::StatusCode, body: String, channel_id: i64) -> DeliveryError {
        if status == reqwest::StatusCode::NOT_FOUND {
            return match Self::parse_error_code(&body) {
                Some(UNKNOWN_MESSAGE) => DeliveryError::NotFound,
                Some(UNKNOWN_CHANNEL) | None => DeliveryError::InvalidChannel(channel_id),
                Some(_) => DeliveryError::NotFound,
            };
        }
        DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        }
    }

    /// Send a request once, and once more after the advertised wait when rate limited.
    async fn send(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        channel_id: i64,
    ) -> Result<reqwest::Response, DeliveryError> {
        let mut retried = false;
        loop {
            let response = build()
                .header("Authorization", self.auth_header())
                .send()
                .await
                .map_err(|e| DeliveryError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let error_text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && !retried {
                if let Some(retry_after) = Self::parse_retry_after(&error_text) {
                    let wait_seconds = (retry_after.ceil() as u64) + 1;
                    tracing::warn!(
                        "Discord rate limit hit, waiting {} seconds before retry",
                        wait_seconds
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(wait_seconds)).await;
                    retried = true;
                    continue;
                }
            }

            return Err(Self::classify(status, error_text, channel_id));
        }
    }
}

#[async_trait]
impl Messenger for DiscordService {
    async fn deliver_message(
        &self,
        channel_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, DeliveryError> {
        let url = self.api_url(&format!("/channels/{}/messages", channel_id));
        let body = DiscordMessage::from(message);

        let response = self
            .send(|| self.client.post(&url).json(&body), channel_id)
            .await?;

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(format!("Failed to parse message response: {}", e)))?;
        created
            .id
            .parse()
            .map_err(|_| DeliveryError::Transport(format!("Unexpected message id '{}'", created.id)))
    }

    async fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), DeliveryError> {
        let url = self.api_url(&format!("/channels/{}/messages/{}", channel_id, message_id));
        let body = DiscordMessage::from(message);

        self.send(|| self.client.patch(&url).json(&body), channel_id)
            .await?;
        Ok(())
    }

    async fn fetch_message(&self, channel_id: i64, message_id: i64) -> Result<(), DeliveryError> {
        let url = self.api_url(&format!("/channels/{}/messages/{}", channel_id, message_id));

        self.send(|| self.client.get(&url), channel_id).await?;
        Ok(())
    }
}
