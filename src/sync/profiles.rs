//! Participant resolution. Failures here never fail the caller: anything that
//! cannot be resolved becomes [`Participant::Unresolved`].

use std::collections::{BTreeSet, HashMap};

use crate::backend::DataService;
use crate::common::{Message, Participant, Profile, TranscriptEntry, UserId};
use crate::error::{MarketError, Result};

/// Distinct sender and receiver ids, in a stable order.
pub fn participant_ids(messages: &[Message]) -> Vec<UserId> {
    messages
        .iter()
        .flat_map(|m| [m.sender_id.clone(), m.receiver_id.clone()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One batched lookup for every participant of `messages`.
///
/// A failed lookup is logged and yields an empty map, which downgrades every
/// participant to the placeholder.
pub async fn resolve_batch<B: DataService + ?Sized>(
    backend: &B,
    messages: &[Message],
) -> HashMap<UserId, Profile> {
    let ids = participant_ids(messages);
    if ids.is_empty() {
        return HashMap::new();
    }

    match backend.fetch_profiles(&ids).await {
        Ok(profiles) => profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        Err(err) => {
            log::warn!(
                "Batched profile lookup for {} users failed, using placeholders: {err}",
                ids.len()
            );
            HashMap::new()
        }
    }
}

/// Point lookup that reports a missing profile as [`MarketError::ProfileUnresolved`].
pub async fn resolve_one<B: DataService + ?Sized>(backend: &B, id: &str) -> Result<Profile> {
    match backend.fetch_profile(id).await {
        Ok(Some(profile)) => Ok(profile),
        Ok(None) => Err(MarketError::ProfileUnresolved(id.to_string())),
        Err(err) => {
            log::debug!("Profile lookup for {id} failed: {err}");
            Err(MarketError::ProfileUnresolved(id.to_string()))
        }
    }
}

/// Turn a lookup result into an annotation, absorbing the error.
pub fn participant(id: &str, lookup: Result<Profile>) -> Participant {
    match lookup {
        Ok(profile) => Participant::Resolved(profile),
        Err(err) => {
            log::warn!("{err}; showing placeholder");
            Participant::Unresolved { id: id.to_string() }
        }
    }
}

pub fn annotate(message: Message, profiles: &HashMap<UserId, Profile>) -> TranscriptEntry {
    let sender = lookup_in(profiles, &message.sender_id);
    let receiver = lookup_in(profiles, &message.receiver_id);
    TranscriptEntry {
        message,
        sender,
        receiver,
    }
}

fn lookup_in(profiles: &HashMap<UserId, Profile>, id: &str) -> Participant {
    match profiles.get(id) {
        Some(profile) => Participant::Resolved(profile.clone()),
        None => Participant::Unresolved { id: id.to_string() },
    }
}
