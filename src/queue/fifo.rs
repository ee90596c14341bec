//! Priority-then-arrival ordered entry store.
//!
//! Keys are `(Reverse(priority), sequence)` so a plain ordered map yields
//! the highest priority first and, within a class, the earliest arrival.

use core::cmp::Reverse;
use core::fmt;
use std::collections::BTreeMap;

/// Scheduling class of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Identity of an entry, used for logging and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct PriorityFifo<T> {
    entries: BTreeMap<(Reverse<Priority>, u64), T>,
    next_seq: u64,
}

impl<T> PriorityFifo<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn add(&mut self, priority: Priority, item: T) -> EntryId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((Reverse(priority), seq), item);
        EntryId(seq)
    }

    /// Remove the highest-priority, earliest entry.
    pub fn pop(&mut self) -> Option<(EntryId, T)> {
        self.entries
            .pop_first()
            .map(|((_, seq), item)| (EntryId(seq), item))
    }

    /// Remove by identity. `None` if it was already taken.
    pub fn remove(&mut self, id: EntryId) -> Option<T> {
        let key = *self.entries.keys().find(|(_, seq)| *seq == id.0)?;
        self.entries.remove(&key)
    }

    /// Take everything, in dequeue order.
    pub fn drain(&mut self) -> Vec<(EntryId, T)> {
        core::mem::take(&mut self.entries)
            .into_iter()
            .map(|((_, seq), item)| (EntryId(seq), item))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T> Default for PriorityFifo<T> {
    fn default() -> Self {
        Self::new()
    }
}
