//! Real-time transcript synchronization for one listing's conversation.
//!
//! History comes from one bulk fetch; new messages come from an insert feed.
//! Both paths can deliver the same message, so consumers merge through
//! [`Transcript`], which de-duplicates by id and keeps time order.

pub mod profiles;
pub mod roles;
pub mod transcript;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{DataService, FeedId};
use crate::common::{ConversationKey, Listing, LiveEvent, Message, NewMessage, TranscriptEntry};
use crate::error::{MarketError, Result};

pub use roles::infer_recipient;
pub use transcript::Transcript;

/// Capability for one live subscription.
///
/// Holding a handle does not keep the feed alive; it only lets the holder
/// release the subscription it opened, and not a newer one for the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    key: ConversationKey,
    token: u64,
}

impl SubscriptionHandle {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }
}

struct ActiveFeed {
    token: u64,
    feed: FeedId,
    task: JoinHandle<()>,
}

pub struct TranscriptSynchronizer<B: DataService> {
    backend: Arc<B>,
    active: Mutex<HashMap<ConversationKey, ActiveFeed>>,
    next_token: AtomicU64,
}

impl<B: DataService> TranscriptSynchronizer<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            active: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Fetch the full history of `key`, annotated with participant profiles.
    pub async fn load_history(&self, key: &ConversationKey) -> Result<Vec<TranscriptEntry>> {
        self.require_listing(key).await?;

        let mut messages = self.backend.fetch_messages(key).await?;
        messages.sort_by_key(|m| m.created_at);

        let directory = profiles::resolve_batch(self.backend.as_ref(), &messages).await;
        let entries: Vec<_> = messages
            .into_iter()
            .map(|m| profiles::annotate(m, &directory))
            .collect();

        let degraded = entries.iter().filter(|e| e.resolved_count() < 2).count();
        if degraded > 0 {
            log::warn!("{degraded} message(s) in {key} have unresolved participants");
        }
        log::info!("Loaded {} message(s) for {key}", entries.len());
        Ok(entries)
    }

    /// Open the live feed for `key` and forward enriched inserts to `on_event`.
    ///
    /// An existing subscription for the same key is released first.
    pub async fn subscribe<F>(&self, key: &ConversationKey, on_event: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(LiveEvent) + Send + 'static,
    {
        let feed = self.backend.subscribe_inserts(key).await?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(forward_feed(
            Arc::clone(&self.backend),
            key.clone(),
            feed.receiver,
            on_event,
        ));

        let previous = self.active().insert(
            key.clone(),
            ActiveFeed {
                token,
                feed: feed.id,
                task,
            },
        );
        if let Some(previous) = previous {
            log::warn!("Replacing live subscription for {key}");
            self.stop(previous);
        }

        log::info!("Subscribed to {key}");
        Ok(SubscriptionHandle {
            key: key.clone(),
            token,
        })
    }

    /// Release the live feed of `key`. Safe to call any number of times.
    pub fn unsubscribe(&self, key: &ConversationKey) {
        let removed = self.active().remove(key);
        if let Some(active) = removed {
            self.stop(active);
            log::info!("Unsubscribed from {key}");
        }
    }

    /// Release the subscription `handle` refers to, if it is still the active one.
    pub fn release(&self, handle: &SubscriptionHandle) -> bool {
        let removed = {
            let mut active = self.active();
            let is_current = active
                .get(&handle.key)
                .is_some_and(|current| current.token == handle.token);
            if is_current {
                active.remove(&handle.key)
            } else {
                None
            }
        };
        match removed {
            Some(active) => {
                self.stop(active);
                log::info!("Released subscription for {}", handle.key);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, key: &ConversationKey) -> bool {
        self.active().contains_key(key)
    }

    /// Write a message from `sender_id`. The stored copy comes back through
    /// the live feed as well, so callers must not append the return value
    /// without de-duplicating.
    pub async fn append_outgoing(
        &self,
        key: &ConversationKey,
        sender_id: &str,
        content: &str,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(MarketError::EmptyMessage);
        }

        let listing = self.require_listing(key).await?;
        let prior = if sender_id == listing.owner_id {
            let mut prior = self.backend.fetch_messages(key).await?;
            prior.sort_by_key(|m| m.created_at);
            prior
        } else {
            Vec::new()
        };
        let receiver_id = infer_recipient(&listing.owner_id, sender_id, &prior)?;

        let message = self
            .backend
            .insert_message(NewMessage {
                conversation_key: key.clone(),
                sender_id: sender_id.to_string(),
                receiver_id,
                content: content.to_string(),
            })
            .await?;
        log::info!(
            "Sent message {} in {key} from {} to {}",
            message.id,
            message.sender_id,
            message.receiver_id
        );
        Ok(message)
    }

    async fn require_listing(&self, key: &ConversationKey) -> Result<Listing> {
        self.backend
            .fetch_listing(key.as_str())
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("listing {key}")))
    }

    fn active(&self) -> MutexGuard<'_, HashMap<ConversationKey, ActiveFeed>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self, active: ActiveFeed) {
        active.task.abort();
        self.backend.release_feed(active.feed);
    }
}

impl<B: DataService> Drop for TranscriptSynchronizer<B> {
    fn drop(&mut self) {
        let active: Vec<_> = self.active().drain().map(|(_, feed)| feed).collect();
        for feed in active {
            self.stop(feed);
        }
    }
}

async fn forward_feed<B, F>(
    backend: Arc<B>,
    key: ConversationKey,
    mut inserts: mpsc::UnboundedReceiver<Result<Message>>,
    mut on_event: F,
) where
    B: DataService,
    F: FnMut(LiveEvent) + Send + 'static,
{
    while let Some(item) = inserts.recv().await {
        match item {
            Ok(message) => {
                let (sender_lookup, receiver_lookup) = futures::join!(
                    profiles::resolve_one(backend.as_ref(), &message.sender_id),
                    profiles::resolve_one(backend.as_ref(), &message.receiver_id),
                );
                let sender = profiles::participant(&message.sender_id, sender_lookup);
                let receiver = profiles::participant(&message.receiver_id, receiver_lookup);
                log::debug!("Live message {} in {key}", message.id);
                on_event(LiveEvent::Message(TranscriptEntry {
                    message,
                    sender,
                    receiver,
                }));
            }
            Err(err) => {
                log::warn!("Live feed for {key} reported a fault: {err}");
                on_event(LiveEvent::Fault(err));
            }
        }
    }
    log::debug!("Live feed for {key} closed");
}
