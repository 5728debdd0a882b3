use std::fmt;

use thiserror::Error;

use crate::common::UserId;

/// A single rejected field of the listing or profile form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum MarketError {
    /// The listing (conversation) or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage or transport fault. The caller decides whether to retry.
    #[error("transient backend failure: {0}")]
    TransientIo(String),

    /// Never returned from public operations; absorbed into a placeholder.
    #[error("profile could not be resolved: {0}")]
    ProfileUnresolved(UserId),

    /// The listing owner wrote first and there is nobody to answer to yet.
    #[error("unable to find a recipient for this conversation")]
    NoRecipient,

    #[error("message is empty")]
    EmptyMessage,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no user is logged in")]
    NotAuthenticated,

    #[error("invalid listing: {}", join_fields(.0))]
    InvalidListing(Vec<FieldError>),

    #[error("invalid profile: {}", join_fields(.0))]
    InvalidProfile(Vec<FieldError>),

    #[error("config error: {0}")]
    Config(String),
}

impl MarketError {
    pub fn transient(err: impl fmt::Display) -> Self {
        MarketError::TransientIo(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketError::TransientIo(_))
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, MarketError>;
