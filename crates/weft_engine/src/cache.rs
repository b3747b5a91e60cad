//! The memo table: one entry per reached `(node, item)` pair.

use std::collections::HashMap;
use std::sync::Arc;

use weft_common::Fingerprint;

use crate::output::Emissions;
use crate::value::{AnyValue, ItemKey, NodeId};

#[derive(Clone)]
pub(crate) struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub value: AnyValue,
    /// What an output node emitted for this item, replayed on reuse.
    pub emissions: Option<Arc<Emissions>>,
}

impl CacheEntry {
    pub(crate) fn value(fingerprint: Fingerprint, value: AnyValue) -> Self {
        Self {
            fingerprint,
            value,
            emissions: None,
        }
    }

    pub(crate) fn emitted(fingerprint: Fingerprint, value: AnyValue, emissions: Arc<Emissions>) -> Self {
        Self {
            fingerprint,
            value,
            emissions: Some(emissions),
        }
    }
}

/// Cached values keyed by `(NodeId, ItemKey)`.
///
/// A pass builds a fresh cache as its overlay and only reads the committed
/// one. Committing swaps the overlay in, so entries the pass never reached
/// are dropped.
#[derive(Clone, Default)]
pub(crate) struct NodeCache {
    entries: HashMap<(NodeId, ItemKey), CacheEntry>,
}

impl NodeCache {
    pub(crate) fn get(&self, node: NodeId, key: ItemKey) -> Option<&CacheEntry> {
        self.entries.get(&(node, key))
    }

    pub(crate) fn insert(&mut self, node: NodeId, key: ItemKey, entry: CacheEntry) {
        self.entries.insert((node, key), entry);
    }

    pub(crate) fn extend(&mut self, node: NodeId, entries: Vec<(ItemKey, CacheEntry)>) {
        for (key, entry) in entries {
            self.insert(node, key, entry);
        }
    }

    /// Entries of one node, ordered by item key.
    pub(crate) fn entries_of(&self, node: NodeId) -> Vec<(ItemKey, &CacheEntry)> {
        let mut entries: Vec<(ItemKey, &CacheEntry)> = self
            .entries
            .iter()
            .filter(|((owner, _), _)| *owner == node)
            .map(|((_, key), entry)| (*key, entry))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries in `self` that `next` no longer holds.
    pub(crate) fn evicted_by(&self, next: &NodeCache) -> usize {
        self.entries
            .keys()
            .filter(|key| !next.entries.contains_key(key))
            .count()
    }
}
