use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::common::{
    ConversationKey, Listing, Message, NewListing, NewMessage, Profile, ProfileUpdate, UserId,
};
use crate::error::{MarketError, Result};
use crate::storage::models::{BookRow, MessageRow, UserRow};
use crate::storage::{MarketDatabase, ensure_parent_dir};

use super::{DataService, FeedId, InsertFeed};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// [`DataService`] over a SQLite file.
///
/// Live feeds poll the `messages` table, so inserts made by other processes
/// sharing the same file are delivered too.
pub struct LocalBackend {
    db: Arc<Mutex<MarketDatabase>>,
    current_user: Option<UserId>,
    poll_interval: Duration,
    next_feed: AtomicU64,
    feeds: Mutex<HashMap<FeedId, JoinHandle<()>>>,
}

impl LocalBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent_dir(path).map_err(MarketError::transient)?;
        let db = MarketDatabase::with_path(path).map_err(MarketError::transient)?;
        log::info!("Opened marketplace database at {}", path.display());
        Ok(Self::from_database(db))
    }

    pub fn in_memory() -> Result<Self> {
        let db = MarketDatabase::in_memory().map_err(MarketError::transient)?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: MarketDatabase) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            current_user: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            next_feed: AtomicU64::new(1),
            feeds: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_current_user(mut self, user: Option<UserId>) -> Self {
        self.current_user = user;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn active_feeds(&self) -> usize {
        self.feeds().len()
    }

    fn feeds(&self) -> MutexGuard<'_, HashMap<FeedId, JoinHandle<()>>> {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_db<T>(
        &self,
        op: impl FnOnce(&MarketDatabase) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let db = lock_db(&self.db)?;
        op(&db).map_err(MarketError::transient)
    }
}

impl Drop for LocalBackend {
    fn drop(&mut self) {
        for (_, task) in self.feeds().drain() {
            task.abort();
        }
    }
}

fn lock_db(db: &Mutex<MarketDatabase>) -> Result<MutexGuard<'_, MarketDatabase>> {
    db.lock()
        .map_err(|_| MarketError::TransientIo("database lock poisoned".to_string()))
}

fn non_blank(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl DataService for LocalBackend {
    fn current_user(&self) -> Option<UserId> {
        self.current_user.clone()
    }

    async fn fetch_listing(&self, id: &str) -> Result<Option<Listing>> {
        let row = self.with_db(|db| db.find_book(id))?;
        Ok(row.map(Listing::from))
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let rows = self.with_db(|db| db.all_books())?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn fetch_listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>> {
        let rows = self.with_db(|db| db.books_by_owner(owner_id))?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn insert_listing(&self, owner_id: &str, listing: NewListing) -> Result<Listing> {
        let row = BookRow {
            id: Uuid::new_v4().to_string(),
            user_id: owner_id.to_string(),
            title: listing.title.trim().to_string(),
            author: listing.author.trim().to_string(),
            price: listing.price,
            category: listing.category,
            condition: listing.condition,
            description: listing
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            contact_number: listing.contact_number.trim().to_string(),
            image_url: listing.image_url,
            created_at: now_millis(),
        };
        self.with_db(|db| db.insert_book(&row))?;
        log::info!("Listed book {} for owner {}", row.id, owner_id);
        Ok(row.into())
    }

    async fn fetch_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let rows = self.with_db(|db| db.messages_for_book(key.as_str()))?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn fetch_profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>> {
        let rows = self.with_db(|db| db.users_in(ids))?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>> {
        let row = self.with_db(|db| db.find_user(id))?;
        Ok(row.map(Profile::from))
    }

    async fn find_profile_by_name(&self, username: &str) -> Result<Option<Profile>> {
        let row = self.with_db(|db| db.find_user_by_name(username))?;
        Ok(row.map(Profile::from))
    }

    async fn insert_profile(&self, username: &str, avatar: Option<String>) -> Result<Profile> {
        let username = username.trim();
        let db = lock_db(&self.db)?;
        if db
            .find_user_by_name(username)
            .map_err(MarketError::transient)?
            .is_some()
        {
            return Err(MarketError::AlreadyExists(format!("username {username}")));
        }
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            avatar_url: avatar,
            phone: None,
            bio: None,
            created_at: now_millis(),
        };
        db.insert_user(&row).map_err(MarketError::transient)?;
        log::info!("Registered user {} ({})", row.username, row.id);
        Ok(row.into())
    }

    async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Profile> {
        let db = lock_db(&self.db)?;
        let mut row = db
            .find_user(id)
            .map_err(MarketError::transient)?
            .ok_or_else(|| MarketError::NotFound(format!("user {id}")))?;

        if let Some(name) = update.display_name {
            let name = name.trim().to_string();
            let taken = db
                .find_user_by_name(&name)
                .map_err(MarketError::transient)?
                .is_some_and(|other| other.id != row.id);
            if taken {
                return Err(MarketError::AlreadyExists(format!("username {name}")));
            }
            row.username = name;
        }
        if let Some(phone) = update.phone {
            row.phone = non_blank(phone);
        }
        if let Some(bio) = update.bio {
            row.bio = non_blank(bio);
        }

        db.update_user(&row).map_err(MarketError::transient)?;
        log::info!("Updated profile of {}", row.id);
        Ok(row.into())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        let mut row = MessageRow {
            seq: 0,
            id: Uuid::new_v4().to_string(),
            book_id: message.conversation_key.0,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            created_at: now_millis(),
        };
        row.seq = self.with_db(|db| db.insert_message(&row))?;
        log::debug!("Inserted message {} (seq {}) into {}", row.id, row.seq, row.book_id);
        Ok(row.into())
    }

    async fn subscribe_inserts(&self, key: &ConversationKey) -> Result<InsertFeed> {
        let mut cursor = self.with_db(|db| db.max_message_seq())?;
        let id = FeedId(self.next_feed.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        let db = Arc::clone(&self.db);
        let book_id = key.as_str().to_string();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                let batch = lock_db(&db).and_then(|db| {
                    db.messages_after(&book_id, cursor)
                        .map_err(MarketError::transient)
                });

                match batch {
                    Ok(rows) => {
                        for row in rows {
                            cursor = row.seq;
                            if tx.send(Ok(row.into())).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        log::warn!("Live feed poll for {book_id} failed: {err}");
                        if tx.send(Err(err)).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        self.feeds().insert(id, task);
        log::info!("Opened insert feed {} for {}", id.0, key);

        Ok(InsertFeed { id, receiver: rx })
    }

    fn release_feed(&self, feed: FeedId) {
        let task = self.feeds().remove(&feed);
        if let Some(task) = task {
            task.abort();
            log::info!("Released insert feed {}", feed.0);
        }
    }
}
