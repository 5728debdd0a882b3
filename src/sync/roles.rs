use crate::common::{Message, UserId};
use crate::error::{MarketError, Result};

/// Pick the receiver of an outgoing message.
///
/// A buyer always writes to the listing owner. The owner answers the first
/// participant other than themselves seen in `prior`.
pub fn infer_recipient(owner_id: &str, sender_id: &str, prior: &[Message]) -> Result<UserId> {
    if sender_id != owner_id {
        return Ok(owner_id.to_string());
    }

    prior
        .iter()
        .find(|m| m.sender_id != owner_id)
        .map(|m| m.sender_id.clone())
        .ok_or(MarketError::NoRecipient)
}
