//! Ledger state map and deltas
//!
//! A [`StateMap`] is the ordered leaf set of one ledger plus the set of tree
//! nodes that have not yet arrived from the network. Two maps can be diffed
//! into a [`Delta`]; the diff is bounded and reports [`NotComparable`] instead
//! of failing when it cannot be produced cheaply or correctly.

use crate::crypto::hash_leaf;
use crate::merkle::merkle_root;
use crate::types::{Hash256, LedgerEntry, LedgerKey};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Set of changed leaves between two states, ordered by key
pub type Delta = BTreeMap<LedgerKey, DeltaItem>;

/// Old and new version of one changed leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaItem {
    /// Leaf in the older state, if present
    pub old: Option<LedgerEntry>,
    /// Leaf in the newer state, if present
    pub new: Option<LedgerEntry>,
}

/// How a leaf changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// Present only in the newer state
    Added,
    /// Present in both with different content
    Changed,
    /// Present only in the older state
    Deleted,
}

impl DeltaItem {
    /// Classify the change. `None` when neither side holds the leaf.
    pub fn kind(&self) -> Option<DeltaKind> {
        match (&self.old, &self.new) {
            (None, Some(_)) => Some(DeltaKind::Added),
            (Some(_), Some(_)) => Some(DeltaKind::Changed),
            (Some(_), None) => Some(DeltaKind::Deleted),
            (None, None) => None,
        }
    }
}

/// Why two states could not be diffed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotComparable {
    /// One side is the empty "no ledger" form
    Sentinel,
    /// One side has tree nodes that are not available locally
    Incomplete,
    /// More leaves changed than the configured bound
    TooManyChanges {
        /// Bound that was exceeded
        limit: usize,
    },
}

impl fmt::Display for NotComparable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotComparable::Sentinel => write!(f, "no ledger to diff against"),
            NotComparable::Incomplete => write!(f, "state tree incomplete"),
            NotComparable::TooManyChanges { limit } => {
                write!(f, "more than {} changed leaves", limit)
            }
        }
    }
}

/// Result of diffing two states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The delta was produced
    Computed(Delta),
    /// The states cannot be diffed; callers reimport in full
    NotComparable(NotComparable),
}

/// Ordered leaf set of one ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateMap {
    leaves: BTreeMap<LedgerKey, LedgerEntry>,
    missing: BTreeSet<Hash256>,
}

impl StateMap {
    /// Create an empty, complete state
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from entries; each is stored under its own key
    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut state = Self::new();
        for entry in entries {
            state.insert(entry);
        }
        state
    }

    /// Insert or replace a leaf, returning the previous version
    pub fn insert(&mut self, entry: LedgerEntry) -> Option<LedgerEntry> {
        self.leaves.insert(entry.key(), entry)
    }

    /// Remove a leaf
    pub fn remove(&mut self, key: &LedgerKey) -> Option<LedgerEntry> {
        self.leaves.remove(key)
    }

    /// Look up a leaf
    pub fn get(&self, key: &LedgerKey) -> Option<&LedgerEntry> {
        self.leaves.get(key)
    }

    /// Number of leaves held
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True if no leaves are held
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Record that a tree node is still being acquired
    pub fn mark_missing(&mut self, node: Hash256) {
        self.missing.insert(node);
    }

    /// Record that a previously missing node has arrived
    pub fn resolve_missing(&mut self, node: &Hash256) -> bool {
        self.missing.remove(node)
    }

    /// True when every tree node is available locally
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Up to `max` node hashes that are still needed
    pub fn missing_nodes(&self, max: usize) -> Vec<Hash256> {
        self.missing.iter().take(max).copied().collect()
    }

    /// Visit every leaf in key order. Fails if the tree is incomplete.
    pub fn visit_leaves<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&LedgerKey, &LedgerEntry) -> Result<()>,
    {
        self.ensure_complete()?;
        for (key, entry) in &self.leaves {
            f(key, entry)?;
        }
        Ok(())
    }

    /// Leaf hashes in key order
    pub fn leaf_hashes(&self) -> Result<Vec<(LedgerKey, Hash256)>> {
        self.ensure_complete()?;
        self.leaves
            .iter()
            .map(|(key, entry)| Ok((*key, hash_leaf(key, entry)?)))
            .collect()
    }

    /// Merkle root over the leaf hashes
    pub fn root_hash(&self) -> Result<Hash256> {
        let leaves: Vec<Hash256> = self.leaf_hashes()?.into_iter().map(|(_, h)| h).collect();
        Ok(merkle_root(&leaves))
    }

    /// Diff this (newer) state against `older`.
    ///
    /// Produces at most `max_changes` items; exceeding the bound or an
    /// incomplete tree on either side yields [`DeltaOutcome::NotComparable`].
    pub fn compare(&self, older: &StateMap, max_changes: usize) -> DeltaOutcome {
        if !self.is_complete() || !older.is_complete() {
            return DeltaOutcome::NotComparable(NotComparable::Incomplete);
        }

        let mut delta = Delta::new();
        let mut ours = self.leaves.iter().peekable();
        let mut theirs = older.leaves.iter().peekable();

        loop {
            let order = match (ours.peek(), theirs.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((a, _)), Some((b, _))) => a.cmp(b),
            };

            let (key, item) = match order {
                Ordering::Less => {
                    let Some((key, new)) = ours.next() else { break };
                    (*key, DeltaItem { old: None, new: Some(new.clone()) })
                }
                Ordering::Greater => {
                    let Some((key, old)) = theirs.next() else { break };
                    (*key, DeltaItem { old: Some(old.clone()), new: None })
                }
                Ordering::Equal => {
                    let (Some((key, new)), Some((_, old))) = (ours.next(), theirs.next()) else {
                        break;
                    };
                    if new == old {
                        continue;
                    }
                    (
                        *key,
                        DeltaItem {
                            old: Some(old.clone()),
                            new: Some(new.clone()),
                        },
                    )
                }
            };

            if delta.len() >= max_changes {
                return DeltaOutcome::NotComparable(NotComparable::TooManyChanges {
                    limit: max_changes,
                });
            }
            delta.insert(key, item);
        }

        DeltaOutcome::Computed(delta)
    }

    fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(Error::IncompleteState(format!(
                "{} state node(s) missing",
                self.missing.len()
            )))
        }
    }
}
