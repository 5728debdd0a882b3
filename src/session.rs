use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::DataService;
use crate::common::{
    ConversationKey, Listing, LiveEvent, Message, Notice, NoticeKind, TranscriptEntry, UserId,
};
use crate::error::{MarketError, Result};
use crate::sync::{SubscriptionHandle, Transcript, TranscriptSynchronizer, infer_recipient};

/// What a live event did to the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Appended(TranscriptEntry),
    /// Already present, typically the echo of our own send.
    Duplicate,
    Fault(Notice),
}

/// State of one open conversation view.
pub struct ChatSession<B: DataService> {
    sync: Arc<TranscriptSynchronizer<B>>,
    key: ConversationKey,
    user_id: UserId,
    listing: Listing,
    transcript: Transcript,
    events: mpsc::UnboundedReceiver<LiveEvent>,
    handle: Option<SubscriptionHandle>,
    notices: Vec<Notice>,
}

impl<B: DataService> ChatSession<B> {
    /// Subscribe to `key`, then load its history.
    ///
    /// Subscribing first means nothing inserted during the history load is
    /// missed; anything seen twice is dropped by the transcript merge.
    pub async fn open(sync: Arc<TranscriptSynchronizer<B>>, key: ConversationKey) -> Result<Self> {
        let user_id = sync
            .backend()
            .current_user()
            .ok_or(MarketError::NotAuthenticated)?;
        let listing = sync
            .backend()
            .fetch_listing(key.as_str())
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("listing {key}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = sync
            .subscribe(&key, move |event| {
                let _ = tx.send(event);
            })
            .await?;

        let mut session = Self {
            sync,
            key,
            user_id,
            listing,
            transcript: Transcript::new(),
            events: rx,
            handle: Some(handle),
            notices: Vec::new(),
        };

        let history = session.sync.load_history(&session.key).await?;
        session.transcript.merge(history);
        session.pump();
        Ok(session)
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_mine(&self, entry: &TranscriptEntry) -> bool {
        entry.message.sender_id == self.user_id
    }

    /// The other party from the current user's side, when one is known.
    pub fn counterpart(&self) -> Option<UserId> {
        let prior: Vec<Message> = self
            .transcript
            .entries()
            .iter()
            .map(|e| e.message.clone())
            .collect();
        infer_recipient(&self.listing.owner_id, &self.user_id, &prior).ok()
    }

    /// Apply every live event already queued. Returns how many were new.
    pub fn pump(&mut self) -> usize {
        let mut added = 0;
        while let Ok(event) = self.events.try_recv() {
            if matches!(self.apply(event), SessionUpdate::Appended(_)) {
                added += 1;
            }
        }
        added
    }

    /// Wait for the next live event. `None` once the session is closed.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let event = self.events.recv().await?;
        Some(self.apply(event))
    }

    pub async fn send(&mut self, content: &str) -> Result<Message> {
        match self
            .sync
            .append_outgoing(&self.key, &self.user_id, content)
            .await
        {
            Ok(message) => Ok(message),
            Err(err) => {
                self.notices.push(Notice::from_error(NoticeKind::SendFailed, &err));
                Err(err)
            }
        }
    }

    /// Fetch history again and merge it, e.g. after a transient failure.
    pub async fn reload(&mut self) -> Result<usize> {
        match self.sync.load_history(&self.key).await {
            Ok(history) => Ok(self.transcript.merge(history)),
            Err(err) => {
                self.notices.push(Notice::from_error(NoticeKind::LoadFailed, &err));
                Err(err)
            }
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Release the live feed. Further calls do nothing.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.sync.release(&handle);
        }
    }

    fn apply(&mut self, event: LiveEvent) -> SessionUpdate {
        match event {
            LiveEvent::Message(entry) => {
                if self.transcript.push_live(entry.clone()) {
                    SessionUpdate::Appended(entry)
                } else {
                    SessionUpdate::Duplicate
                }
            }
            LiveEvent::Fault(err) => {
                let notice = Notice::from_error(NoticeKind::FeedFault, &err);
                self.notices.push(notice.clone());
                SessionUpdate::Fault(notice)
            }
        }
    }
}

impl<B: DataService> Drop for ChatSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}
