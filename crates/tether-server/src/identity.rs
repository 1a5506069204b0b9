//! The identity history that decides whether a connection resumes an earlier one

use std::collections::VecDeque;
use tether_types::ClientId;

/// The two most recently observed client identities.
///
/// Pushing a third identity evicts the oldest. A new connection counts as the
/// continuation of an interrupted one exactly when both entries are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHistory {
    entries: VecDeque<ClientId>,
}

impl IdentityHistory {
    /// Number of identities remembered
    pub const CAPACITY: usize = 2;

    /// Create an empty history
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(Self::CAPACITY),
        }
    }

    /// Record an identity, forgetting the oldest one when full
    pub fn push(&mut self, id: ClientId) {
        if self.entries.len() == Self::CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(id);
    }

    /// Whether the last two identities are the same
    pub fn is_resumption(&self) -> bool {
        self.entries.len() == Self::CAPACITY && self.entries.front() == self.entries.back()
    }

    /// Remembered identities, oldest first
    pub fn entries(&self) -> Vec<ClientId> {
        self.entries.iter().copied().collect()
    }

    /// Number of remembered identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
