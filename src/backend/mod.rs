//! The data service the marketplace talks to.
//!
//! Authentication, relational storage and change notification are owned by
//! an external service. Everything in this crate goes through [`DataService`],
//! so the synchronizer and the catalog work the same against the bundled
//! [`LocalBackend`] and against a fake in tests.

pub mod local;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::{
    ConversationKey, Listing, Message, NewListing, NewMessage, Profile, ProfileUpdate, UserId,
};
use crate::error::Result;

pub use local::LocalBackend;

/// Identifies one open insert feed on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedId(pub u64);

/// Live feed of inserted messages for one conversation.
///
/// The backend keeps delivering until [`DataService::release_feed`] is called
/// or the receiver is dropped.
pub struct InsertFeed {
    pub id: FeedId,
    pub receiver: mpsc::UnboundedReceiver<Result<Message>>,
}

#[async_trait]
pub trait DataService: Send + Sync + 'static {
    /// Id of the authenticated user, if any.
    fn current_user(&self) -> Option<UserId>;

    async fn fetch_listing(&self, id: &str) -> Result<Option<Listing>>;

    /// All listings, newest first.
    async fn fetch_listings(&self) -> Result<Vec<Listing>>;

    async fn fetch_listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>>;

    async fn insert_listing(&self, owner_id: &str, listing: NewListing) -> Result<Listing>;

    /// Messages of a conversation ordered by `created_at` ascending.
    async fn fetch_messages(&self, key: &ConversationKey) -> Result<Vec<Message>>;

    /// Profiles whose id is in `ids`. Unknown ids are left out of the result.
    async fn fetch_profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>>;

    async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>>;

    async fn find_profile_by_name(&self, username: &str) -> Result<Option<Profile>>;

    async fn insert_profile(&self, username: &str, avatar: Option<String>) -> Result<Profile>;

    /// Apply `update` to the profile `id`. A name taken by another user is
    /// `AlreadyExists`; an unknown id is `NotFound`.
    async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Profile>;

    /// Insert one message; the backend assigns id and timestamp.
    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// Open a feed of insert events filtered to `key`.
    async fn subscribe_inserts(&self, key: &ConversationKey) -> Result<InsertFeed>;

    /// Stop a feed. Unknown or already released ids are ignored.
    fn release_feed(&self, feed: FeedId);
}
