use crate::error::MarketError;

use super::types::TranscriptEntry;

/// Event delivered by a live feed subscription.
#[derive(Debug)]
pub enum LiveEvent {
    Message(TranscriptEntry),
    /// The feed hit a transport fault. The subscription stays open.
    Fault(MarketError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    LoadFailed,
    SendFailed,
    FeedFault,
}

/// Something the view layer should show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub retryable: bool,
}

impl Notice {
    pub fn from_error(kind: NoticeKind, err: &MarketError) -> Self {
        Self {
            kind,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
