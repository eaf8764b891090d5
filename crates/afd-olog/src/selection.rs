//! The operator's selection over a `LogIndex`.

use std::collections::BTreeMap;

use crate::reader::{IndexEntry, LogIndex};
use crate::summary::{Summary, SummaryAccumulator};
use crate::Result;

/// How a selection changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Replace the selection with one position
    Initial(usize),
    /// Replace the selection with exactly these positions
    Modification(Vec<usize>),
    /// Toggle one position
    Addition(usize),
}

/// Ordered set of selected positions with a running summary
#[derive(Debug, Clone, Default)]
pub struct Selection {
    selected: BTreeMap<usize, IndexEntry>,
    acc: SummaryAccumulator,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every position of `index`.
    pub fn all(index: &LogIndex) -> Self {
        let mut selection = Self::new();
        for (pos, entry) in index.entries().iter().enumerate() {
            selection.insert(pos, *entry);
        }
        selection
    }

    /// Apply a transition. Unknown positions fail with `NotFound` and leave
    /// the selection unchanged.
    pub fn apply(&mut self, index: &LogIndex, transition: Transition) -> Result<()> {
        match transition {
            Transition::Initial(pos) => {
                let entry = *index.entry(pos)?;
                self.clear();
                self.insert(pos, entry);
            }
            Transition::Modification(positions) => {
                let entries = positions
                    .iter()
                    .map(|&pos| index.entry(pos).map(|e| (pos, *e)))
                    .collect::<Result<Vec<_>>>()?;
                self.selected = entries.into_iter().collect();
                self.acc = SummaryAccumulator::from_entries(self.selected.values());
            }
            Transition::Addition(pos) => {
                let entry = *index.entry(pos)?;
                if !self.deselect(pos) {
                    self.insert(pos, entry);
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, pos: usize, entry: IndexEntry) {
        if self.selected.insert(pos, entry).is_none() {
            self.acc.add(&entry);
        }
    }

    /// Drop `pos`; returns whether it was selected.
    pub fn deselect(&mut self, pos: usize) -> bool {
        match self.selected.remove(&pos) {
            Some(entry) => {
                self.acc.remove(&entry);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.acc = SummaryAccumulator::new();
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.selected.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected positions in ascending order.
    pub fn positions(&self) -> Vec<usize> {
        self.selected.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &IndexEntry)> {
        self.selected.iter().map(|(pos, entry)| (*pos, entry))
    }

    pub fn summary(&self) -> Summary {
        self.acc.summary()
    }
}
