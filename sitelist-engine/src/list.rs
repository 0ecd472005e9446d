/*!
The active site list: an ordered set of unique entries
*/

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::entry::Entry;
use crate::error::{EngineError, Result};

/// Ordered, duplicate-free list of entries. Insertion order is display and persist order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SiteList {
    entries: Vec<Entry>,
}

impl SiteList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from stored entries, keeping the first occurrence of each.
    pub fn from_entries<I: IntoIterator<Item = Entry>>(entries: I) -> Self {
        let mut list = Self::new();
        for entry in entries {
            if list.add(entry.clone()).is_err() {
                debug!("Dropping repeated entry {} while loading", entry);
            }
        }
        list
    }

    /// Append an entry, rejecting exact duplicates.
    pub fn add(&mut self, entry: Entry) -> Result<()> {
        if self.contains(&entry) {
            return Err(EngineError::DuplicateEntry(entry));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Resolve 1-based display positions to entries, highest position first.
    ///
    /// Out-of-range positions are ignored and repeated positions count once.
    pub fn resolve_indices(&self, indices: &[usize]) -> Vec<(usize, Entry)> {
        let positions: BTreeSet<usize> = indices
            .iter()
            .copied()
            .filter(|&idx| idx >= 1 && idx <= self.entries.len())
            .collect();

        positions
            .into_iter()
            .rev()
            .map(|idx| (idx, self.entries[idx - 1].clone()))
            .collect()
    }

    /// Remove the entries at the given 1-based positions of the current list.
    ///
    /// Positions are removed from highest to lowest so that every supplied
    /// position refers to the list as it was displayed.
    pub fn remove_by_indices(&mut self, indices: &[usize]) -> Vec<Entry> {
        let targets = self.resolve_indices(indices);
        let mut removed = Vec::with_capacity(targets.len());
        for (idx, _) in targets {
            removed.push(self.entries.remove(idx - 1));
        }
        removed
    }

    /// Empty the list, returning what it held in display order.
    pub fn remove_all(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.entries)
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.entries.contains(entry)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a SiteList {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
