use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::{MessagingGateway, ReplyButton};
use crate::errors::ServiceError;

/// HTTP client for a WhatsApp-Cloud-style messaging API. Messages are posted
/// to `{base_url}/{phone_number_id}/messages` with bearer-token auth.
#[derive(Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
    phone_number_id: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

impl WhatsAppClient {
    pub fn new(base_url: String, phone_number_id: String, api_token: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client with static config"),
            base_url: base_url.trim_end_matches('/').to_string(),
            phone_number_id,
            api_token,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }

    async fn post_message(&self, payload: Value) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamProviderError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body, "provider rejected outbound message");
            return Err(ServiceError::UpstreamProviderError(format!(
                "send failed with status {}",
                status
            )));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::UpstreamProviderError(e.to_string()))?;
        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| {
                ServiceError::UpstreamProviderError(
                    "provider response contained no message id".to_string(),
                )
            })
    }
}

#[async_trait]
impl MessagingGateway for WhatsAppClient {
    #[instrument(skip(self, body), fields(to = %to))]
    async fn send_text(&self, to: &str, body: &str) -> Result<String, ServiceError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "preview_url": false, "body": body },
        });

        let id = self.post_message(payload).await?;
        debug!(provider_message_id = %id, "text message sent");
        Ok(id)
    }

    #[instrument(skip(self, body, buttons), fields(to = %to))]
    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<String, ServiceError> {
        let rendered: Vec<Value> = buttons
            .iter()
            .map(|b| {
                json!({
                    "type": "reply",
                    "reply": { "id": b.id, "title": b.title },
                })
            })
            .collect();

        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": { "text": body },
                "action": { "buttons": rendered },
            },
        });

        let id = self.post_message(payload).await?;
        debug!(provider_message_id = %id, "interactive message sent");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, provider_message_id: &str) -> Result<(), ServiceError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": provider_message_id,
        });

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamProviderError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::UpstreamProviderError(format!(
                "mark-read failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WhatsAppClient {
        WhatsAppClient::new(server.uri(), "123456".to_string(), "token-abc".to_string())
    }

    #[tokio::test]
    async fn send_text_posts_payload_and_returns_provider_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123456/messages"))
            .and(bearer_token("token-abc"))
            .and(body_partial_json(json!({
                "type": "text",
                "to": "33612345678",
                "text": { "body": "bonjour" },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "wamid.SENT1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .send_text("33612345678", "bonjour")
            .await
            .expect("send");
        assert_eq!(id, "wamid.SENT1");
    }

    #[tokio::test]
    async fn send_buttons_renders_reply_actions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123456/messages"))
            .and(body_partial_json(json!({
                "type": "interactive",
                "interactive": {
                    "action": { "buttons": [
                        { "type": "reply", "reply": { "id": "view_products", "title": "Produits" } }
                    ]},
                },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "wamid.SENT2" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .send_buttons(
                "33612345678",
                "Que souhaitez-vous faire ?",
                &[ReplyButton::new("view_products", "Produits")],
            )
            .await
            .expect("send");
        assert_eq!(id, "wamid.SENT2");
    }

    #[tokio::test]
    async fn provider_error_status_maps_to_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123456/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_text("33612345678", "bonjour")
            .await
            .expect_err("must fail");
        assert!(matches!(err, ServiceError::UpstreamProviderError(_)));
    }
}
