use std::collections::HashMap;

use crate::common::{MessageId, Participant, TranscriptEntry};

/// Ordered, de-duplicated view of one conversation.
///
/// Entries stay sorted by `created_at`; entries with equal timestamps keep the
/// order in which they were first merged.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    index: HashMap<MessageId, usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch from either source. Returns how many entries were new.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = TranscriptEntry>) -> usize {
        let mut added = 0;
        for entry in incoming {
            match self.index.get(entry.id()) {
                Some(&pos) => {
                    let existing = &mut self.entries[pos];
                    upgrade(&mut existing.sender, entry.sender);
                    upgrade(&mut existing.receiver, entry.receiver);
                }
                None => {
                    self.index.insert(entry.id().to_string(), self.entries.len());
                    self.entries.push(entry);
                    added += 1;
                }
            }
        }

        if added > 0 {
            self.resort();
        }
        added
    }

    /// Merge one live entry. `false` means it was already present.
    pub fn push_live(&mut self, entry: TranscriptEntry) -> bool {
        self.merge(std::iter::once(entry)) == 1
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    fn resort(&mut self) {
        // sort_by_key is stable, so equal timestamps keep merge order
        self.entries.sort_by_key(|entry| entry.created_at());
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.id().to_string(), pos))
            .collect();
    }
}

/// Replace a placeholder with a resolved profile; never the other way round.
fn upgrade(current: &mut Participant, incoming: Participant) {
    if !current.is_resolved() && incoming.is_resolved() {
        *current = incoming;
    }
}
