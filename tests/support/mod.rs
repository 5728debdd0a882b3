#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bookswap::backend::{DataService, FeedId, InsertFeed};
use bookswap::common::{
    ConversationKey, Listing, Message, NewListing, NewMessage, Profile, ProfileUpdate, UserId,
};
use bookswap::{MarketError, Result};
use tokio::sync::mpsc;

/// In-memory data service with switchable faults and manual feed control.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    current_user: Option<UserId>,
    listings: HashMap<String, Listing>,
    profiles: HashMap<UserId, Profile>,
    messages: Vec<Message>,
    feeds: HashMap<FeedId, (ConversationKey, mpsc::UnboundedSender<Result<Message>>)>,
    released: Vec<FeedId>,
    next_feed: u64,
    next_message: u64,
    clock: i64,
    fail_messages: bool,
    fail_profiles: bool,
    fail_inserts: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn act_as(&self, user: Option<&str>) {
        self.state().current_user = user.map(str::to_string);
    }

    pub fn add_profile(&self, id: &str, name: &str) {
        self.state().profiles.insert(
            id.to_string(),
            Profile {
                id: id.to_string(),
                display_name: name.to_string(),
                avatar_reference: Some(format!("avatars/{id}.png")),
                phone: None,
                bio: None,
            },
        );
    }

    pub fn add_listing(&self, id: &str, owner: &str) {
        self.state().listings.insert(
            id.to_string(),
            Listing {
                id: id.to_string(),
                owner_id: owner.to_string(),
                title: format!("Book {id}"),
                author: "Anon".to_string(),
                price: 100.0,
                category: "Fiction".to_string(),
                condition: "Good".to_string(),
                description: None,
                contact_number: "5550001111".to_string(),
                image_url: None,
                created_at: 1,
            },
        );
    }

    /// Store a message without notifying feeds, as if it predates them.
    pub fn seed(&self, id: &str, book: &str, sender: &str, receiver: &str, text: &str, at: i64) -> Message {
        let message = message(id, book, sender, receiver, text, at);
        let mut state = self.state();
        state.clock = state.clock.max(at);
        state.messages.push(message.clone());
        message
    }

    /// Deliver `message` to every open feed on its conversation.
    pub fn emit(&self, message: &Message) {
        let state = self.state();
        for (key, tx) in state.feeds.values() {
            if *key == message.conversation_key {
                let _ = tx.send(Ok(message.clone()));
            }
        }
    }

    pub fn emit_fault(&self, book: &str) {
        let state = self.state();
        for (key, tx) in state.feeds.values() {
            if key.as_str() == book {
                let _ = tx.send(Err(MarketError::transient("realtime socket dropped")));
            }
        }
    }

    pub fn fail_messages(&self, fail: bool) {
        self.state().fail_messages = fail;
    }

    pub fn fail_profiles(&self, fail: bool) {
        self.state().fail_profiles = fail;
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.state().fail_inserts = fail;
    }

    pub fn open_feeds(&self) -> usize {
        self.state().feeds.len()
    }

    pub fn released(&self) -> Vec<FeedId> {
        self.state().released.clone()
    }

    pub fn stored(&self, book: &str) -> Vec<Message> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.conversation_key.as_str() == book)
            .cloned()
            .collect()
    }
}

pub fn message(id: &str, book: &str, sender: &str, receiver: &str, text: &str, at: i64) -> Message {
    Message {
        id: id.to_string(),
        conversation_key: ConversationKey::new(book),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
        content: text.to_string(),
        created_at: at,
    }
}

pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}

#[async_trait]
impl DataService for FakeBackend {
    fn current_user(&self) -> Option<UserId> {
        self.state().current_user.clone()
    }

    async fn fetch_listing(&self, id: &str) -> Result<Option<Listing>> {
        Ok(self.state().listings.get(id).cloned())
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let mut listings: Vec<_> = self.state().listings.values().cloned().collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings)
    }

    async fn fetch_listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>> {
        Ok(self
            .state()
            .listings
            .values()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn insert_listing(&self, owner_id: &str, listing: NewListing) -> Result<Listing> {
        let mut state = self.state();
        state.clock += 1;
        let stored = Listing {
            id: format!("book-{}", state.listings.len() + 1),
            owner_id: owner_id.to_string(),
            title: listing.title,
            author: listing.author,
            price: listing.price,
            category: listing.category,
            condition: listing.condition,
            description: listing.description,
            contact_number: listing.contact_number,
            image_url: listing.image_url,
            created_at: state.clock,
        };
        state.listings.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    /// Returned in storage order; the synchronizer is expected to sort.
    async fn fetch_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let state = self.state();
        if state.fail_messages {
            return Err(MarketError::transient("connection reset"));
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_key == *key)
            .cloned()
            .collect())
    }

    async fn fetch_profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>> {
        let state = self.state();
        if state.fail_profiles {
            return Err(MarketError::transient("profiles view unavailable"));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }

    async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>> {
        let state = self.state();
        if state.fail_profiles {
            return Err(MarketError::transient("profiles view unavailable"));
        }
        Ok(state.profiles.get(id).cloned())
    }

    async fn find_profile_by_name(&self, username: &str) -> Result<Option<Profile>> {
        Ok(self
            .state()
            .profiles
            .values()
            .find(|p| p.display_name == username)
            .cloned())
    }

    async fn insert_profile(&self, username: &str, avatar: Option<String>) -> Result<Profile> {
        let mut state = self.state();
        let profile = Profile {
            id: format!("user-{}", state.profiles.len() + 1),
            display_name: username.to_string(),
            avatar_reference: avatar,
            phone: None,
            bio: None,
        };
        state.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Profile> {
        let mut state = self.state();
        let profile = state
            .profiles
            .get_mut(id)
            .ok_or_else(|| MarketError::NotFound(format!("user {id}")))?;
        if let Some(name) = update.display_name {
            profile.display_name = name;
        }
        if let Some(phone) = update.phone {
            profile.phone = Some(phone).filter(|p| !p.is_empty());
        }
        if let Some(bio) = update.bio {
            profile.bio = Some(bio).filter(|b| !b.is_empty());
        }
        Ok(profile.clone())
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message> {
        let mut state = self.state();
        if state.fail_inserts {
            return Err(MarketError::transient("insert timed out"));
        }
        state.next_message += 1;
        state.clock += 10;
        let stored = Message {
            id: format!("sent-{}", state.next_message),
            conversation_key: new.conversation_key,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            created_at: state.clock,
        };
        state.messages.push(stored.clone());
        for (key, tx) in state.feeds.values() {
            if *key == stored.conversation_key {
                let _ = tx.send(Ok(stored.clone()));
            }
        }
        Ok(stored)
    }

    async fn subscribe_inserts(&self, key: &ConversationKey) -> Result<InsertFeed> {
        let mut state = self.state();
        state.next_feed += 1;
        let id = FeedId(state.next_feed);
        let (tx, rx) = mpsc::unbounded_channel();
        state.feeds.insert(id, (key.clone(), tx));
        Ok(InsertFeed { id, receiver: rx })
    }

    fn release_feed(&self, feed: FeedId) {
        let mut state = self.state();
        if state.feeds.remove(&feed).is_some() {
            state.released.push(feed);
        }
    }
}
