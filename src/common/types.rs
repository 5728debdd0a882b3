use std::fmt;

use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type MessageId = String;

/// Shown in place of a participant whose profile cannot be resolved.
pub const PLACEHOLDER_NAME: &str = "Unknown user";

/// Identifies one listing's discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey(pub String);

impl ConversationKey {
    pub fn new(listing_id: impl Into<String>) -> Self {
        Self(listing_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_key: ConversationKey,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    /// Unix timestamp in milliseconds, assigned by the backend.
    pub created_at: i64,
}

/// A message about to be inserted; id and timestamp come from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_key: ConversationKey,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_reference: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Edit of the current user's profile. `None` leaves a field as it is;
/// an empty phone or bio clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.phone.is_none() && self.bio.is_none()
    }
}

/// Sender or receiver annotation on a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Participant {
    Resolved(Profile),
    Unresolved { id: UserId },
}

impl Participant {
    pub fn id(&self) -> &str {
        match self {
            Participant::Resolved(profile) => &profile.id,
            Participant::Unresolved { id } => id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Participant::Resolved(profile) => &profile.display_name,
            Participant::Unresolved { .. } => PLACEHOLDER_NAME,
        }
    }

    pub fn avatar_reference(&self) -> Option<&str> {
        match self {
            Participant::Resolved(profile) => profile.avatar_reference.as_deref(),
            Participant::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Participant::Resolved(_))
    }
}

/// A message annotated with its resolved participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub message: Message,
    pub sender: Participant,
    pub receiver: Participant,
}

impl TranscriptEntry {
    pub fn id(&self) -> &str {
        &self.message.id
    }

    pub fn created_at(&self) -> i64 {
        self.message.created_at
    }

    pub fn resolved_count(&self) -> usize {
        usize::from(self.sender.is_resolved()) + usize::from(self.receiver.is_resolved())
    }
}

/// A book offered for sale. Its id doubles as the conversation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub owner_id: UserId,
    pub title: String,
    pub author: String,
    pub price: f64,
    pub category: String,
    pub condition: String,
    pub description: Option<String>,
    pub contact_number: String,
    pub image_url: Option<String>,
    pub created_at: i64,
}

impl Listing {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.id.clone())
    }
}

/// The sell form, before validation and insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub title: String,
    pub author: String,
    pub price: f64,
    pub category: String,
    pub condition: String,
    pub description: Option<String>,
    pub contact_number: String,
    pub image_url: Option<String>,
}
