use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geometry::RectF;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryEntry {
    Page { page: usize, rect: RectF },
    Destination(String),
}

/// Back/forward navigation history with browser semantics.
///
/// Adding after stepping back discards the forward entries, and an entry equal
/// to the one under the cursor is not added twice.
#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: VecDeque<HistoryEntry>,
    cursor: Option<usize>,
    limit: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryStack {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            limit: limit.max(1),
        }
    }

    pub fn add_page(&mut self, page: usize, rect: RectF) {
        self.add(HistoryEntry::Page { page, rect });
    }

    pub fn add_destination(&mut self, name: impl Into<String>) {
        self.add(HistoryEntry::Destination(name.into()));
    }

    pub fn add(&mut self, entry: HistoryEntry) {
        match self.cursor {
            Some(cursor) => self.entries.truncate(cursor + 1),
            None => self.entries.clear(),
        }

        if self.entries.back() != Some(&entry) {
            self.entries.push_back(entry);
            while self.entries.len() > self.limit {
                self.entries.pop_front();
            }
        }
        self.cursor = self.entries.len().checked_sub(1);
    }

    pub fn previous(&mut self) -> Option<&HistoryEntry> {
        let cursor = self.cursor?.checked_sub(1)?;
        self.cursor = Some(cursor);
        self.entries.get(cursor)
    }

    pub fn next(&mut self) -> Option<&HistoryEntry> {
        let cursor = self.cursor? + 1;
        if cursor >= self.entries.len() {
            return None;
        }
        self.cursor = Some(cursor);
        self.entries.get(cursor)
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor?)
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor.is_some_and(|cursor| cursor > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor
            .is_some_and(|cursor| cursor + 1 < self.entries.len())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: usize) -> HistoryEntry {
        HistoryEntry::Page {
            page,
            rect: RectF::default(),
        }
    }

    #[test]
    fn adding_after_going_back_discards_forward_entries() {
        let mut history = HistoryStack::default();
        history.add(page(1));
        history.add(page(2));
        history.add(page(3));

        assert_eq!(history.previous(), Some(&page(2)));
        assert_eq!(history.previous(), Some(&page(1)));
        history.add(page(5));

        assert_eq!(history.len(), 2);
        assert_eq!(history.next(), None);
        assert_eq!(history.previous(), Some(&page(1)));
        assert_eq!(history.next(), Some(&page(5)));
    }

    #[test]
    fn consecutive_duplicates_are_collapsed() {
        let mut history = HistoryStack::default();
        history.add_page(4, RectF::new(0.0, 10.0, 100.0, 20.0));
        history.add_page(4, RectF::new(0.0, 10.0, 100.0, 20.0));
        history.add_destination("intro");
        history.add_destination("intro");
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), Some(1));
    }

    #[test]
    fn re_adding_the_entry_under_the_cursor_keeps_position() {
        let mut history = HistoryStack::default();
        history.add(page(1));
        history.add(page(2));
        history.previous();
        history.add(page(1));
        assert_eq!(history.len(), 1);
        assert_eq!(history.current(), Some(&page(1)));
    }

    #[test]
    fn ends_return_none() {
        let mut history = HistoryStack::default();
        assert_eq!(history.previous(), None);
        assert_eq!(history.next(), None);
        history.add(page(0));
        assert_eq!(history.previous(), None);
        assert_eq!(history.next(), None);
        assert!(!history.can_go_back());
        assert!(!history.can_go_forward());
    }

    #[test]
    fn limit_drops_oldest_entries() {
        let mut history = HistoryStack::new(3);
        for p in 0..5 {
            history.add(page(p));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.previous(), Some(&page(3)));
        assert_eq!(history.previous(), Some(&page(2)));
        assert_eq!(history.previous(), None);
    }

    #[test]
    fn clear_resets_cursor() {
        let mut history = HistoryStack::default();
        history.add(page(1));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.cursor(), None);
        assert_eq!(history.current(), None);
    }
}
