pub mod events;
pub mod types;

pub use events::{LiveEvent, Notice, NoticeKind};
pub use types::{
    ConversationKey, Listing, Message, MessageId, NewListing, NewMessage, PLACEHOLDER_NAME,
    Participant, Profile, ProfileUpdate, TranscriptEntry, UserId,
};
