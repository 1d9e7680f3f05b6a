//! Messaging boundary.
//!
//! Everything the engine sends to the chat platform goes through the
//! [`Messenger`] trait. Delivery is best-effort: the helpers at the bottom of
//! this module are the single place where a [`DeliveryError`] is caught and
//! logged, so roster state never depends on the network.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("message not found")]
    NotFound,

    #[error("channel {0} is not a valid message target")]
    InvalidChannel(i64),

    #[error("messaging is not configured")]
    Unavailable,

    #[error("platform rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub color: Option<u32>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Interactive controls attached to a roster post: a role picker and a
/// leave button, both keyed by event id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignupView {
    pub event_id: i64,
    pub roles: Vec<(String, i64)>,
}

impl SignupView {
    pub fn select_id(&self) -> String {
        format!("raid:{}:role", self.event_id)
    }

    pub fn leave_id(&self) -> String {
        format!("raid:{}:leave", self.event_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub view: Option<SignupView>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Post a new message and return its id.
    async fn deliver_message(
        &self,
        channel_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, DeliveryError>;

    /// Replace the content, embed and controls of an existing message.
    async fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), DeliveryError>;

    /// Check that a message still exists.
    async fn fetch_message(&self, channel_id: i64, message_id: i64) -> Result<(), DeliveryError>;
}

/// Used when no bot token is configured.
pub struct DisabledMessenger;

#[async_trait]
impl Messenger for DisabledMessenger {
    async fn deliver_message(&self, _: i64, _: &OutgoingMessage) -> Result<i64, DeliveryError> {
        Err(DeliveryError::Unavailable)
    }

    async fn edit_message(&self, _: i64, _: i64, _: &OutgoingMessage) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unavailable)
    }

    async fn fetch_message(&self, _: i64, _: i64) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unavailable)
    }
}

/// Post a message, logging failures. Returns the new message id on success.
pub async fn deliver_best_effort(
    messenger: &dyn Messenger,
    channel_id: i64,
    message: &OutgoingMessage,
    what: &str,
) -> Option<i64> {
    match messenger.deliver_message(channel_id, message).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!("Failed to deliver {} to channel {}: {}", what, channel_id, e);
            None
        }
    }
}

/// Fetch then edit an existing message. A vanished message is skipped quietly.
pub async fn edit_best_effort(
    messenger: &dyn Messenger,
    channel_id: i64,
    message_id: i64,
    message: &OutgoingMessage,
    what: &str,
) -> bool {
    let result = match messenger.fetch_message(channel_id, message_id).await {
        Ok(()) => messenger.edit_message(channel_id, message_id, message).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => true,
        Err(DeliveryError::NotFound) => {
            tracing::debug!(
                "Skipping {} update: message {} in channel {} no longer exists",
                what,
                message_id,
                channel_id
            );
            false
        }
        Err(e) => {
            tracing::warn!(
                "Failed to update {} (message {} in channel {}): {}",
                what,
                message_id,
                channel_id,
                e
            );
            false
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Delivered {
            channel_id: i64,
            message: OutgoingMessage,
        },
        Edited {
            channel_id: i64,
            message_id: i64,
            message: OutgoingMessage,
        },
    }

    /// In-memory messenger that records traffic and can be told to fail.
    #[derive(Default)]
    pub struct RecordingMessenger {
        sent: Mutex<Vec<Sent>>,
        fail: Mutex<bool>,
        next_id: Mutex<i64>,
    }

    impl RecordingMessenger {
        pub fn failing() -> Self {
            let m = Self::default();
            m.set_failing(true);
            m
        }

        pub fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn delivered_texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Delivered { message, .. } => message.content,
                    _ => None,
                })
                .collect()
        }

        fn check(&self) -> Result<(), DeliveryError> {
            if *self.fail.lock().unwrap() {
                Err(DeliveryError::Transport("simulated outage".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn deliver_message(
            &self,
            channel_id: i64,
            message: &OutgoingMessage,
        ) -> Result<i64, DeliveryError> {
            self.check()?;
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            self.sent.lock().unwrap().push(Sent::Delivered {
                channel_id,
                message: message.clone(),
            });
            Ok(1000 + *next)
        }

        async fn edit_message(
            &self,
            channel_id: i64,
            message_id: i64,
            message: &OutgoingMessage,
        ) -> Result<(), DeliveryError> {
            self.check()?;
            self.sent.lock().unwrap().push(Sent::Edited {
                channel_id,
                message_id,
                message: message.clone(),
            });
            Ok(())
        }

        async fn fetch_message(&self, _: i64, _: i64) -> Result<(), DeliveryError> {
            self.check()
        }
    }
}
