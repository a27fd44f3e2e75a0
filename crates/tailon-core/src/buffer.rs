use std::collections::VecDeque;

use crate::entry::{LogEntry, NewEntry};

pub const DEFAULT_CAPACITY: usize = 2000;
pub const DEFAULT_FOLLOW_THRESHOLD: u64 = 40;

/// Scroll position of the log view, in abstract units. The projection layer
/// picks the unit (rows for a terminal) and reports the viewport height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollAnchor {
    pub offset: u64,
    pub viewport: u64,
    pub row_height: u64,
    pub threshold: u64,
}

impl Default for ScrollAnchor {
    fn default() -> Self {
        Self {
            offset: 0,
            viewport: 0,
            row_height: 1,
            threshold: DEFAULT_FOLLOW_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub inserted: usize,
    pub evicted: usize,
    pub followed: bool,
}

/// Bounded, append-only history of log entries with an auto-follow policy.
///
/// Entries are evicted oldest first once `capacity` is exceeded; a capacity of
/// zero keeps everything. The newest entry is the "current" one.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    auto_scroll: bool,
    scroll: ScrollAnchor,
    current: Option<u64>,
    next_seq: u64,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            auto_scroll: true,
            scroll: ScrollAnchor::default(),
            current: None,
            next_seq: 1,
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.scroll.threshold = threshold;
        self
    }

    pub fn with_row_height(mut self, row_height: u64) -> Self {
        self.scroll.row_height = row_height.max(1);
        self
    }

    pub fn append(&mut self, entries: Vec<NewEntry>) -> AppendOutcome {
        if entries.is_empty() {
            return AppendOutcome::default();
        }

        let followed = self.auto_scroll && self.distance_from_bottom() < self.scroll.threshold;
        let inserted = entries.len();
        for entry in entries {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.push_back(LogEntry::from_new(seq, entry));
        }
        let evicted = self.trim();

        if followed {
            self.scroll.offset = self.bottom();
        } else {
            self.shift_for_eviction(evicted);
        }
        self.current = self.entries.back().map(LogEntry::seq);

        AppendOutcome {
            inserted,
            evicted,
            followed,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
        self.scroll.offset = 0;
    }

    /// Newly appended entries that survived eviction, oldest first.
    pub fn appended(&self, outcome: &AppendOutcome) -> impl Iterator<Item = &LogEntry> {
        self.recent(outcome.inserted)
    }

    pub fn recent(&self, count: usize) -> impl Iterator<Item = &LogEntry> {
        let start = self.entries.len().saturating_sub(count);
        self.entries.range(start..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the history limit, evicting immediately when it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity;
        let evicted = self.trim();
        self.shift_for_eviction(evicted);
        evicted
    }

    pub fn current(&self) -> Option<&LogEntry> {
        let seq = self.current?;
        self.entries.back().filter(|entry| entry.seq() == seq)
    }

    pub fn is_current(&self, entry: &LogEntry) -> bool {
        self.current == Some(entry.seq())
    }

    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    pub fn set_auto_scroll(&mut self, enabled: bool) {
        self.auto_scroll = enabled;
    }

    pub fn scroll(&self) -> ScrollAnchor {
        self.scroll
    }

    pub fn set_viewport(&mut self, viewport: u64) {
        self.scroll.viewport = viewport;
        self.scroll.offset = self.scroll.offset.min(self.bottom());
    }

    pub fn scroll_to(&mut self, offset: u64) {
        self.scroll.offset = offset.min(self.bottom());
    }

    pub fn scroll_by(&mut self, delta: i64) {
        let target = if delta.is_negative() {
            self.scroll.offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.scroll.offset.saturating_add(delta as u64)
        };
        self.scroll_to(target);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll.offset = self.bottom();
    }

    pub fn content_height(&self) -> u64 {
        self.entries.len() as u64 * self.scroll.row_height
    }

    /// Largest valid offset: the position that shows the newest entry.
    pub fn bottom(&self) -> u64 {
        self.content_height().saturating_sub(self.scroll.viewport)
    }

    pub fn distance_from_bottom(&self) -> u64 {
        self.bottom().abs_diff(self.scroll.offset)
    }

    /// Entries intersecting the viewport.
    pub fn visible(&self) -> impl Iterator<Item = &LogEntry> {
        let row_height = self.scroll.row_height.max(1);
        let first = (self.scroll.offset / row_height) as usize;
        let rows = self.scroll.viewport.div_ceil(row_height) as usize;
        let first = first.min(self.entries.len());
        let end = first.saturating_add(rows).min(self.entries.len());
        self.entries.range(first..end)
    }

    /// Keeps the same entries under a scrolled-away view when the head is
    /// evicted.
    fn shift_for_eviction(&mut self, evicted: usize) {
        let shift = evicted as u64 * self.scroll.row_height;
        self.scroll.offset = self.scroll.offset.saturating_sub(shift).min(self.bottom());
    }

    fn trim(&mut self) -> usize {
        if self.capacity == 0 || self.entries.len() <= self.capacity {
            return 0;
        }
        let excess = self.entries.len() - self.capacity;
        self.entries.drain(..excess);
        excess
    }
}
