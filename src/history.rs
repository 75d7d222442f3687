//! Bounded linear undo/redo over whole-value snapshots.
use std::collections::VecDeque;

use log::trace;

/// Maximum number of snapshots kept for undo.
pub const HISTORY_LIMIT: usize = 20;

/// Undo/redo engine holding complete snapshots of a value.
///
/// `past` is ordered oldest to newest, `future` is ordered next-redo first.
#[derive(Debug, Clone)]
pub struct HistoryStack<T> {
    past: VecDeque<T>,
    present: T,
    future: VecDeque<T>,
    limit: usize,
}

impl<T: Clone> HistoryStack<T> {
    /// Creates a stack with the default limit of [`HISTORY_LIMIT`] entries.
    pub fn new(initial: T) -> Self {
        Self::with_limit(initial, HISTORY_LIMIT)
    }

    pub fn with_limit(initial: T, limit: usize) -> Self {
        Self {
            past: VecDeque::with_capacity(limit),
            present: initial,
            future: VecDeque::new(),
            limit,
        }
    }

    pub fn present(&self) -> &T {
        &self.present
    }

    pub fn past(&self) -> impl Iterator<Item = &T> {
        self.past.iter()
    }

    pub fn future(&self) -> impl Iterator<Item = &T> {
        self.future.iter()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Replaces `present` with `mutator(present)`.
    ///
    /// When `record_history` is set the previous value is pushed onto `past`
    /// (evicting the oldest entry at the limit) and `future` is cleared.
    pub fn apply<F>(&mut self, mutator: F, record_history: bool)
    where
        F: FnOnce(&T) -> T,
    {
        let next = mutator(&self.present);
        let previous = std::mem::replace(&mut self.present, next);

        if record_history {
            self.push_past(previous);
            self.future.clear();
        }
    }

    /// Steps back one snapshot. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        trace!(
            "undo: past={} future={}",
            self.past.len(),
            self.future.len()
        );
        true
    }

    /// Re-applies the most recently undone snapshot. Returns false when there
    /// is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.push_past(current);
        trace!(
            "redo: past={} future={}",
            self.past.len(),
            self.future.len()
        );
        true
    }

    /// Drops all undo and redo state, keeping `present`.
    pub fn reset(&mut self, present: T) {
        self.past.clear();
        self.future.clear();
        self.present = present;
    }

    fn push_past(&mut self, snapshot: T) {
        if self.limit == 0 {
            return;
        }
        while self.past.len() >= self.limit {
            self.past.pop_front();
        }
        self.past.push_back(snapshot);
    }
}
