use serde::Deserialize;
use serde_json::Value;

/// Provider webhook envelope. Only the fields the pipeline consumes are
/// modelled; everything else stays in the raw JSON.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<ProviderMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: Option<String>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderMessage {
    pub from: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub text: Option<TextContent>,
    pub interactive: Option<Interactive>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Interactive {
    pub button_reply: Option<InteractiveReply>,
    pub list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveReply {
    pub id: Option<String>,
    pub title: Option<String>,
}

/// What the pipeline hands to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub wa_id: String,
    pub provider_message_id: String,
    pub profile_name: Option<String>,
    pub kind: InboundKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Text { body: String },
    Interactive { reply_id: String },
}

impl InboundMessage {
    pub fn message_type(&self) -> &'static str {
        match self.kind {
            InboundKind::Text { .. } => "text",
            InboundKind::Interactive { .. } => "interactive",
        }
    }

    pub fn body_text(&self) -> Option<&str> {
        match &self.kind {
            InboundKind::Text { body } => Some(body),
            InboundKind::Interactive { .. } => None,
        }
    }
}

/// Pulls the first actionable message out of a raw delivery. Status-only
/// callbacks (delivery receipts) and malformed shapes yield `None`.
pub fn first_message(raw: &Value) -> Option<InboundMessage> {
    let payload: WebhookPayload = serde_json::from_value(raw.clone()).ok()?;

    let value = payload
        .entry
        .into_iter()
        .flat_map(|e| e.changes)
        .map(|c| c.value)
        .find(|v| !v.messages.is_empty())?;

    let profile_name = value
        .contacts
        .first()
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.clone());

    let message = value.messages.into_iter().next()?;
    let wa_id = message.from?;
    let provider_message_id = message.id?;

    let kind = match message.message_type.as_deref() {
        Some("text") => InboundKind::Text {
            body: message.text?.body?,
        },
        Some("interactive") => {
            let interactive = message.interactive?;
            let reply = interactive.button_reply.or(interactive.list_reply)?;
            InboundKind::Interactive {
                reply_id: reply.id?,
            }
        }
        _ => return None,
    };

    Some(InboundMessage {
        wa_id,
        provider_message_id,
        profile_name,
        kind,
    })
}
