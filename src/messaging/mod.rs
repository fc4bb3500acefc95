//! Outbound messaging capability. The rest of the system only sees the
//! [`MessagingGateway`] trait; the concrete provider client lives in
//! [`whatsapp`] and is injected at startup.

pub mod whatsapp;

use async_trait::async_trait;

use crate::errors::ServiceError;

pub use whatsapp::WhatsAppClient;

/// A reply button offered in an interactive message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyButton {
    /// Stable identifier echoed back in the interactive reply
    pub id: String,
    /// Text shown on the button
    pub title: String,
}

impl ReplyButton {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Thin outbound capability over the messaging provider. Implementations
/// return the provider-assigned message id of whatever they sent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, ServiceError>;

    /// Send a text message with reply buttons.
    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<String, ServiceError>;

    /// Mark an inbound message as read on the provider side.
    async fn mark_read(&self, provider_message_id: &str) -> Result<(), ServiceError>;
}
