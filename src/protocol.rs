use serde::{Deserialize, Serialize};

/// Geometry reported by the surface, in host-viewport coordinates.
///
/// Staleness is acceptable: the surface re-sends it on every resize and on
/// explicit request, so no freshness timestamp is carried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsRegion {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single chat message. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Persisted conversation for one host document. `id` stays `None` until the
/// first store write assigns one; after that it never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub url: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConversationRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: None,
            messages: Vec::new(),
            url: url.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A live host resource (browser tab) the surface can reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: u32,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
}

impl TabInfo {
    /// Hostname of the tab URL, or the raw string when it does not parse.
    pub fn base_domain(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(u) => u.host_str().unwrap_or(&self.url).to_string(),
            Err(_) => self.url.clone(),
        }
    }
}

/// Discriminant of [`Envelope`], used as the subscription key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Init,
    RequestBounds,
    Bounds,
    PointerLock,
    Close,
    UpdateConversation,
    GetCurrentTab,
    CurrentTabResponse,
}

/// One unit exchanged over the cross-context channel.
///
/// The variant set is closed: anything that does not deserialize into one of
/// these shapes is dropped by [`Envelope::decode`] rather than rejected with
/// an error, since the counterpart context is untrusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Envelope {
    #[serde(rename_all = "camelCase")]
    Init {
        existing_conversation: Option<ConversationRecord>,
        position: String,
    },
    RequestBounds {},
    Bounds {
        bounds: BoundsRegion,
    },
    PointerLock {
        enabled: bool,
    },
    Close {},
    #[serde(rename_all = "camelCase")]
    UpdateConversation {
        messages: Vec<ChatMessage>,
        conversation_id: Option<String>,
    },
    GetCurrentTab {},
    #[serde(rename_all = "camelCase")]
    CurrentTabResponse {
        tab_id: Option<u32>,
        url: String,
        title: String,
    },
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::Init { .. } => MessageKind::Init,
            Envelope::RequestBounds {} => MessageKind::RequestBounds,
            Envelope::Bounds { .. } => MessageKind::Bounds,
            Envelope::PointerLock { .. } => MessageKind::PointerLock,
            Envelope::Close {} => MessageKind::Close,
            Envelope::UpdateConversation { .. } => MessageKind::UpdateConversation,
            Envelope::GetCurrentTab {} => MessageKind::GetCurrentTab,
            Envelope::CurrentTabResponse { .. } => MessageKind::CurrentTabResponse,
        }
    }

    /// Decode a raw inbound value. Unknown kinds and malformed payloads yield
    /// `None`; the caller drops them silently.
    pub fn decode(raw: serde_json::Value) -> Option<Envelope> {
        match serde_json::from_value(raw) {
            Ok(env) => Some(env),
            Err(e) => {
                tracing::trace!("dropping unrecognized envelope: {e}");
                None
            }
        }
    }

    pub fn encode(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
