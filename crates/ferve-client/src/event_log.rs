use ferve_core::wire::LogEntry;
use std::collections::VecDeque;

pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 50;

/// Bounded activity log, newest entry first.
///
/// `pushed` counts every entry ever inserted, including evicted ones. Slice
/// observers can be woken once for several pushes; they keep the last count
/// they saw and call [`EventLog::since`] to read everything that is new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    pushed: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            pushed: 0,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        self.pushed += 1;
    }

    pub fn head(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn get(&self, index: usize) -> Option<&LogEntry> {
        self.entries.get(index)
    }

    /// Entries newest first.
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

    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Entries pushed after `mark` (a previous [`EventLog::pushed`] value),
    /// oldest first. Entries already evicted are not returned.
    pub fn since(&self, mark: u64) -> Vec<&LogEntry> {
        let fresh = self.pushed.saturating_sub(mark);
        let available = usize::try_from(fresh)
            .unwrap_or(usize::MAX)
            .min(self.entries.len());
        self.entries.iter().take(available).rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(format!("10:00:{n:02}"), format!("line {n}"), "SYSTEM")
    }

    #[test]
    fn overflow_evicts_oldest_and_keeps_newest_first() {
        let mut log = EventLog::default();
        for n in 0..51 {
            log.push(entry(n));
        }

        assert_eq!(log.len(), DEFAULT_EVENT_LOG_CAPACITY);
        assert_eq!(log.head().map(|e| e.message.as_str()), Some("line 50"));
        assert_eq!(log.get(49).map(|e| e.message.as_str()), Some("line 1"));
        assert!(log.iter().all(|e| e.message != "line 0"));
        assert_eq!(log.pushed(), 51);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut log = EventLog::with_capacity(5);
        for n in 0..200 {
            log.push(entry(n));
            assert!(log.len() <= 5);
        }
        let order: Vec<_> = log.iter().map(|e| e.message.clone()).collect();
        assert_eq!(
            order,
            vec!["line 199", "line 198", "line 197", "line 196", "line 195"]
        );
    }

    #[test]
    fn since_returns_new_entries_oldest_first() {
        let mut log = EventLog::default();
        log.push(entry(1));
        let mark = log.pushed();
        log.push(entry(2));
        log.push(entry(3));

        let fresh: Vec<_> = log.since(mark).iter().map(|e| e.message.clone()).collect();
        assert_eq!(fresh, vec!["line 2", "line 3"]);
        assert!(log.since(log.pushed()).is_empty());
    }

    #[test]
    fn since_is_bounded_by_what_is_still_buffered() {
        let mut log = EventLog::with_capacity(3);
        let mark = log.pushed();
        for n in 0..10 {
            log.push(entry(n));
        }
        let fresh: Vec<_> = log.since(mark).iter().map(|e| e.message.clone()).collect();
        assert_eq!(fresh, vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut log = EventLog::with_capacity(0);
        log.push(entry(1));
        log.push(entry(2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.head().map(|e| e.message.as_str()), Some("line 2"));
    }
}
