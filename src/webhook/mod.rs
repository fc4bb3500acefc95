//! Provider-facing webhook endpoints: the subscription challenge and the
//! signed delivery receiver.
//!
//! A delivery moves through received -> verified -> parsed -> dispatched,
//! short-circuiting to rejected on a bad signature or to ignored when the
//! payload carries nothing actionable. The HTTP response is sent as soon as
//! the signature checks out; everything downstream runs on a spawned task so
//! slow handling never triggers the provider's retry timer.

pub mod payload;

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use crate::{chat::Command, entities::message::MessageStatus, errors::ServiceError, AppState};

use self::payload::{first_message, InboundKind, InboundMessage};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Where a delivery ended up; surfaced for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Parsed, persisted and handed to the interpreter
    Dispatched,
    /// Same provider message id seen before; skipped without side effects
    Duplicate,
    /// Nothing actionable in the payload
    Ignored,
    /// Handling failed after the message was persisted
    Failed,
}

/// GET /webhook: subscription verification challenge.
///
/// Echoes `hub.challenge` only for `hub.mode == "subscribe"` with the exact
/// configured token; everything else gets a generic 403.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge");

    if mode == Some("subscribe") && token == Some(state.config.webhook_verify_token.as_str()) {
        if let Some(challenge) = challenge {
            info!("webhook subscription verified");
            return (StatusCode::OK, challenge.clone());
        }
    }

    warn!("webhook verification rejected");
    (StatusCode::FORBIDDEN, "Forbidden".to_string())
}

/// POST /webhook: signed message delivery.
///
/// The signature is computed over the exact raw body bytes; after it checks
/// out the provider always gets a 200, whatever happens downstream.
#[instrument(skip_all)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if !verify_signature(&headers, &body, &state.config.webhook_app_secret) {
        warn!("webhook signature verification failed");
        return Err(ServiceError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(parsed) => {
            tokio::spawn(async move {
                let outcome = process_delivery(&state, parsed).await;
                debug!(?outcome, "webhook delivery processed");
            });
        }
        Err(e) => {
            // Signed but unparseable: acknowledge and drop, a retry would not
            // parse any better.
            warn!(error = %e, "webhook body is not valid JSON, ignoring");
        }
    }

    Ok((StatusCode::OK, "ok"))
}

/// Checks `X-Hub-Signature-256: sha256=<hex>` against an HMAC-SHA256 of the
/// raw payload, in constant time.
pub fn verify_signature(headers: &HeaderMap, body: &Bytes, secret: &str) -> bool {
    let Some(provided) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("sha256="))
    else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, &provided.to_lowercase())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Runs the post-acknowledge half of the pipeline: dedup/persist, best-effort
/// read receipt, then command dispatch. All faults are absorbed here; nothing
/// propagates back to the provider.
pub async fn process_delivery(state: &AppState, raw: Value) -> DeliveryOutcome {
    let Some(inbound) = first_message(&raw) else {
        debug!("webhook delivery carried no actionable message");
        return DeliveryOutcome::Ignored;
    };

    match dispatch_inbound(state, &inbound, &raw).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(
                error = %err,
                provider_message_id = %inbound.provider_message_id,
                "webhook dispatch failed"
            );
            send_fallback(state, &inbound.wa_id).await;
            DeliveryOutcome::Failed
        }
    }
}

async fn dispatch_inbound(
    state: &AppState,
    inbound: &InboundMessage,
    raw: &Value,
) -> Result<DeliveryOutcome, ServiceError> {
    let customer = state
        .services
        .customers
        .find_or_create(&inbound.wa_id, inbound.profile_name.as_deref())
        .await?;

    let Some(stored) = state
        .services
        .messages
        .record_inbound(
            customer.id,
            &inbound.provider_message_id,
            inbound.message_type(),
            inbound.body_text().map(str::to_string),
            Some(raw.clone()),
        )
        .await?
    else {
        // Provider retry or re-delivery: no reply, no stock movement.
        return Ok(DeliveryOutcome::Duplicate);
    };

    // Read receipt is best-effort on both sides of the fence.
    if let Err(e) = state.gateway.mark_read(&inbound.provider_message_id).await {
        warn!(error = %e, "failed to mark message read at the provider");
    } else if let Err(e) = state
        .services
        .messages
        .advance_status(stored.id, MessageStatus::Read)
        .await
    {
        warn!(error = %e, "failed to advance message status to read");
    }

    let command = match &inbound.kind {
        InboundKind::Text { body } => Command::parse(body),
        InboundKind::Interactive { reply_id } => Command::from_interactive_id(reply_id),
    };

    state.interpreter.handle(&customer, command).await?;

    if let Err(e) = state
        .services
        .messages
        .advance_status(stored.id, MessageStatus::Replied)
        .await
    {
        warn!(error = %e, "failed to advance message status to replied");
    }

    Ok(DeliveryOutcome::Dispatched)
}

/// Last-resort plain-language reply when dispatch blew up mid-flight.
async fn send_fallback(state: &AppState, wa_id: &str) {
    let body = "Une erreur est survenue, merci de réessayer dans quelques instants.";
    if let Err(e) = state.gateway.send_text(wa_id, body).await {
        warn!(error = %e, "failed to send fallback message");
    }
}
