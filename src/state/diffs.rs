//! Diff sets: additions and removals relative to committed state.
//!
//! The operations are idempotent and reversible rather than append-only:
//! removing an element that was added in the same transaction cancels the
//! addition outright, adding back a removed element cancels the removal,
//! and `un_remove` supports multi-step DDL that restores a dropped schema
//! object before commit.

use std::hash::Hash;

use rustc_hash::FxHashSet;

/// Additions and removals over a committed base set.
#[derive(Debug, Clone)]
pub struct DiffSet<T> {
    added: FxHashSet<T>,
    removed: FxHashSet<T>,
}

impl<T> Default for DiffSet<T> {
    fn default() -> Self {
        Self {
            added: FxHashSet::default(),
            removed: FxHashSet::default(),
        }
    }
}

impl<T: Eq + Hash + Clone> DiffSet<T> {
    /// Records `element` as added. A pending removal of the same element is
    /// cancelled instead (net no change).
    pub fn add(&mut self, element: T) {
        if !self.removed.remove(&element) {
            self.added.insert(element);
        }
    }

    /// Records `element` as removed. A pending addition of the same element
    /// is cancelled instead (net no change).
    pub fn remove(&mut self, element: T) {
        if !self.added.remove(&element) {
            self.removed.insert(element);
        }
    }

    /// Reverts a pending removal. Returns `true` when there was one.
    pub fn un_remove(&mut self, element: &T) -> bool {
        self.removed.remove(element)
    }

    /// Drops `element` from the added set without recording a removal.
    pub fn retract_addition(&mut self, element: &T) -> bool {
        self.added.remove(element)
    }

    /// Whether `element` is pending addition.
    pub fn is_added(&self, element: &T) -> bool {
        self.added.contains(element)
    }

    /// Whether `element` is pending removal.
    pub fn is_removed(&self, element: &T) -> bool {
        self.removed.contains(element)
    }

    /// Pending additions, in arbitrary order.
    pub fn added(&self) -> impl Iterator<Item = &T> {
        self.added.iter()
    }

    /// Pending removals, in arbitrary order.
    pub fn removed(&self) -> impl Iterator<Item = &T> {
        self.removed.iter()
    }

    /// True when the diff records nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Applies the diff to a committed sequence: removed elements are
    /// filtered out, added elements appended. Untouched elements keep their
    /// relative order.
    pub fn apply<'a>(
        &'a self,
        committed: impl Iterator<Item = T> + 'a,
    ) -> impl Iterator<Item = T> + 'a {
        committed
            .filter(move |e| !self.removed.contains(e) && !self.added.contains(e))
            .chain(self.added.iter().cloned())
    }
}

impl<T: Eq + Hash + Clone + Ord> DiffSet<T> {
    /// Pending additions, sorted. Used where deterministic traversal order
    /// matters (command generation).
    pub fn added_sorted(&self) -> Vec<T> {
        let mut out: Vec<T> = self.added.iter().cloned().collect();
        out.sort();
        out
    }

    /// Pending removals, sorted.
    pub fn removed_sorted(&self) -> Vec<T> {
        let mut out: Vec<T> = self.removed.iter().cloned().collect();
        out.sort();
        out
    }
}
