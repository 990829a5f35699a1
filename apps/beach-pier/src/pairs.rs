use std::collections::HashMap;

use crate::registry::SessionId;

/// Up to two sessions negotiating under one connection id.
///
/// An all-empty pair is never stored; the table deletes it instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    slots: [Option<SessionId>; 2],
}

impl Pair {
    pub fn open(first: SessionId) -> Self {
        Self {
            slots: [Some(first), None],
        }
    }

    pub fn new(slot0: Option<SessionId>, slot1: Option<SessionId>) -> Self {
        Self {
            slots: [slot0, slot1],
        }
    }

    pub fn slots(&self) -> [Option<SessionId>; 2] {
        self.slots
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.slots.contains(&Some(session))
    }

    /// The slot opposite `session`: slot1 when `session` holds slot0, slot0
    /// otherwise (including when `session` is not in the pair).
    pub fn other(&self, session: SessionId) -> Option<SessionId> {
        match self.slots {
            [Some(first), second] if first == session => second,
            [first, _] => first,
        }
    }

    /// Put `session` in the empty slot of an open pair.
    ///
    /// Returns false when the pair is full or `session` already sits in it.
    pub fn fill(&mut self, session: SessionId) -> bool {
        if self.contains(session) {
            return false;
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(session);
                true
            }
            None => false,
        }
    }
}

/// Connection id -> pair lookup.
#[derive(Debug, Default)]
pub struct PairTable {
    pairs: HashMap<String, Pair>,
}

impl PairTable {
    pub fn get(&self, connection_id: &str) -> Option<Pair> {
        self.pairs.get(connection_id).copied()
    }

    /// Store `pair`, dropping it instead if it has no occupant.
    pub fn set(&mut self, connection_id: &str, pair: Pair) {
        if pair.slots.iter().all(Option::is_none) {
            self.pairs.remove(connection_id);
        } else {
            self.pairs.insert(connection_id.to_string(), pair);
        }
    }

    pub fn remove(&mut self, connection_id: &str) -> Option<Pair> {
        self.pairs.remove(connection_id)
    }

    /// Sessions sitting in a complete pair.
    pub fn paired_sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.pairs
            .values()
            .filter(|pair| pair.is_complete())
            .flat_map(|pair| pair.slots.iter().flatten().copied())
    }

    pub fn count_complete(&self) -> usize {
        self.pairs.values().filter(|pair| pair.is_complete()).count()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}
