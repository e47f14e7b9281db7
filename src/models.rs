use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::MessagingError;

/// Prefix reserved for ids of optimistic, not yet confirmed messages.
pub const TEMP_ID_PREFIX: &str = "temp_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Temporary id carried by the pending entry of an optimistic send.
    pub fn temporary(correlation: &CorrelationId) -> Self {
        Self(format!("{TEMP_ID_PREFIX}{correlation}"))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Locally unique id tying a pending entry to the send that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Denormalized profile snapshot as populated by the backend. May be stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
    pub title: Option<String>,
    pub role: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or("Unknown"),
            self.last_name.as_deref().unwrap_or("User")
        )
    }

    pub fn headline(&self) -> &str {
        self.title
            .as_deref()
            .or(self.role.as_deref())
            .unwrap_or("User")
    }
}

/// One side of a message: always an id, sometimes a populated profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub profile: Option<UserProfile>,
}

impl Participant {
    pub fn from_id(id: impl Into<String>) -> Self {
        Self { id: id.into(), profile: None }
    }

    pub fn from_profile(profile: UserProfile) -> Self {
        Self { id: profile.id.clone(), profile: Some(profile) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Participant,
    pub receiver: Participant,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Set only on optimistic entries awaiting server confirmation.
    pub pending: bool,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(id),
            sender: Participant::from_id(sender_id),
            receiver: Participant::from_id(receiver_id),
            text: text.into(),
            created_at,
            pending: false,
        }
    }

    /// Optimistic entry shown before the backend has confirmed the send.
    pub fn pending(
        correlation: &CorrelationId,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::temporary(correlation),
            sender: Participant::from_id(sender_id),
            receiver: Participant::from_id(receiver_id),
            text: text.into(),
            created_at: Utc::now(),
            pending: true,
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender.id
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver.id
    }

    pub fn is_sent_by(&self, user_id: &str) -> bool {
        self.sender.id == user_id
    }

    /// The side of the message that is not `user_id`.
    pub fn counterpart_of(&self, user_id: &str) -> &Participant {
        if self.is_sent_by(user_id) {
            &self.receiver
        } else {
            &self.sender
        }
    }
}

/// Input of a send: who writes to whom, and what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
}

/// Derived list entry, one per counterpart. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub counterpart_id: String,
    pub counterpart_profile: Option<UserProfile>,
    pub last_message_text: String,
    pub last_message_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn display_name(&self) -> String {
        self.counterpart_profile
            .as_ref()
            .map(UserProfile::display_name)
            .unwrap_or_else(|| self.counterpart_id.clone())
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

/// Message as returned by the backend. Ids come as `_id` or `id`; both
/// sides come either as raw ids or as populated user documents.
#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(rename = "_id")]
    mongo_id: Option<String>,
    id: Option<String>,
    sender_id: WireParticipant,
    receiver_id: WireParticipant,
    #[serde(default)]
    message_text: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireParticipant {
    Id(String),
    Profile(WireProfile),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProfile {
    #[serde(rename = "_id")]
    mongo_id: Option<String>,
    id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    profile_image: Option<String>,
    title: Option<String>,
    role: Option<String>,
}

impl TryFrom<WireParticipant> for Participant {
    type Error = MessagingError;

    fn try_from(wire: WireParticipant) -> Result<Self, Self::Error> {
        match wire {
            WireParticipant::Id(id) => Ok(Participant::from_id(id)),
            WireParticipant::Profile(p) => {
                let id = p.mongo_id.or(p.id).ok_or_else(|| MessagingError::InvalidPayload {
                    message: "participant without id".to_string(),
                })?;
                Ok(Participant::from_profile(UserProfile {
                    id,
                    first_name: p.first_name,
                    last_name: p.last_name,
                    profile_image: p.profile_image,
                    title: p.title,
                    role: p.role,
                }))
            }
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = MessagingError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let id = wire.mongo_id.or(wire.id).ok_or_else(|| MessagingError::InvalidPayload {
            message: "message without id".to_string(),
        })?;
        Ok(Message {
            id: MessageId::new(id),
            sender: wire.sender_id.try_into()?,
            receiver: wire.receiver_id.try_into()?,
            text: wire.message_text,
            created_at: wire.created_at,
            pending: false,
        })
    }
}

/// Request body of `POST /messages`.
#[derive(Debug, Serialize)]
pub(crate) struct CreateMessageBody<'a> {
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub message_text: &'a str,
}

/// Request body of `PUT /messages/{id}`.
#[derive(Debug, Serialize)]
pub(crate) struct UpdateMessageBody<'a> {
    pub message_text: &'a str,
}
