//! Client core of a book resale marketplace.
//!
//! The marketplace runs on an external data service; this crate composes its
//! queries, inserts and insert feeds into a chat transcript per listing and a
//! browsable catalog. [`backend::LocalBackend`] provides that service on top
//! of SQLite.

pub mod account;
pub mod backend;
pub mod catalog;
pub mod common;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod sync;

pub use backend::{DataService, LocalBackend};
pub use error::{MarketError, Result};
pub use session::{ChatSession, SessionUpdate};
pub use sync::{SubscriptionHandle, Transcript, TranscriptSynchronizer};
