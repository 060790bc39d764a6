use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The only callback `object` the bot processes.
pub const PAGE_OBJECT: &str = "page";

/// A Messenger participant. Both the page and end users are addressed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(default)]
    pub id: String,
}

impl User {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

/// Top-level webhook payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Callback {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

impl Callback {
    pub fn is_page(&self) -> bool {
        self.object == PAGE_OBJECT
    }

    /// All events across all entries, in payload order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.entry.iter().flat_map(|entry| entry.messaging.iter())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub messaging: Vec<Event>,
}

/// What an inbound event carries.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Message(Message),
    Postback(Postback),
    /// Deliveries, reads and anything else the bot has no reply for.
    Unsupported,
}

/// A normalized messaging event.
///
/// The wire format marks the kind only by which object is present; decoding
/// turns that into an explicit [`EventKind`] so nothing downstream inspects
/// sub-field emptiness.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawEvent")]
pub struct Event {
    pub sender: User,
    pub recipient: User,
    pub timestamp: i64,
    pub kind: EventKind,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    sender: User,
    #[serde(default)]
    recipient: User,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    postback: Option<Postback>,
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        let kind = match (raw.message, raw.postback) {
            (Some(message), _) => EventKind::Message(message),
            (None, Some(postback)) => EventKind::Postback(postback),
            (None, None) => EventKind::Unsupported,
        };
        Self {
            sender: raw.sender,
            recipient: raw.recipient,
            timestamp: raw.timestamp,
            kind,
        }
    }
}

/// Message body, used for inbound classification and outbound sends alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_attachment(attachment: Attachment) -> Self {
        Self {
            attachment: Some(attachment),
            ..Self::default()
        }
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// Button click delivered as a postback.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Postback {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<Referral>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Referral {
    #[serde(default, rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Attachment type discriminator. Unknown types are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttachmentKind {
    Image,
    Template,
    Other(String),
}

impl From<String> for AttachmentKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "image" => Self::Image,
            "template" => Self::Template,
            _ => Self::Other(value),
        }
    }
}

impl From<AttachmentKind> for String {
    fn from(kind: AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Image => "image".to_string(),
            AttachmentKind::Template => "template".to_string(),
            AttachmentKind::Other(other) => other,
        }
    }
}

/// Attachment with a type-dependent payload: a URL for
/// images, an element/button tree for templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Attachment {
    /// Image fetched by the platform from `url`. With `reusable` set the
    /// Send API answers with an `attachment_id` that can be sent again later.
    pub fn image_url(url: &str, reusable: bool) -> Self {
        Self {
            kind: AttachmentKind::Image,
            payload: json!({ "url": url, "is_reusable": reusable }),
        }
    }

    /// Media template showing one uploaded image with buttons below it.
    pub fn media_template(attachment_id: &str, buttons: Vec<Button>) -> Self {
        Self {
            kind: AttachmentKind::Template,
            payload: json!({
                "template_type": "media",
                "elements": [{
                    "media_type": "image",
                    "attachment_id": attachment_id,
                    "buttons": buttons,
                }],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Button {
    WebUrl { title: String, url: String },
    Postback { title: String, payload: String },
}

/// Outbound Send API envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub recipient: User,
    pub message: Message,
}

/// Send API reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
}
