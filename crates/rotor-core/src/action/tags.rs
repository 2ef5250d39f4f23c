//! Correlation id ranges.
//!
//! Locally originated actions draw ids from a reserved, wrapping range.
//! Remote originators (the device's own behaviors, other clients) use
//! disjoint ranges, so the source of a completion notification is known from
//! its id alone.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Ids reserved for locally originated actions.
pub const LOCAL_TAGS: TagRange = TagRange::new(1_000_001, 2_000_000);

/// Ids used by actions queued from the device's game layer.
pub const GAME_TAGS: TagRange = TagRange::new(1, 1_000_000);

/// Ids used by actions queued by the device engine itself.
pub const ENGINE_TAGS: TagRange = TagRange::new(2_000_001, 3_000_000);

/// An inclusive id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRange {
    /// Lowest id in the range.
    pub first: u32,
    /// Highest id in the range.
    pub last: u32,
}

impl TagRange {
    pub const fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    /// Returns true if `id` lies within the range.
    pub fn contains(&self, id: u32) -> bool {
        (self.first..=self.last).contains(&id)
    }

    /// Returns true if the range holds no ids.
    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }

    /// Returns true if both ranges share an id. Empty ranges overlap nothing.
    pub fn overlaps(&self, other: &TagRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.first <= other.last
            && other.first <= self.last
    }
}

impl fmt::Display for TagRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.first, self.last)
    }
}

/// Where a correlation id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// Allocated by this process.
    Local,
    /// Allocated by the device's game layer or engine.
    Remote,
    Unknown,
}

/// The local range plus every known remote range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLayout {
    /// Range local ids are allocated from.
    pub local: TagRange,
    /// Ranges the device allocates from.
    pub remote: Vec<TagRange>,
}

impl TagLayout {
    pub fn new(local: TagRange, remote: Vec<TagRange>) -> Self {
        Self { local, remote }
    }

    /// Tells which range `id` was allocated from.
    pub fn classify(&self, id: u32) -> TagClass {
        if self.local.contains(id) {
            TagClass::Local
        } else if self.remote.iter().any(|range| range.contains(id)) {
            TagClass::Remote
        } else {
            TagClass::Unknown
        }
    }
}

impl Default for TagLayout {
    fn default() -> Self {
        Self::new(LOCAL_TAGS, vec![GAME_TAGS, ENGINE_TAGS])
    }
}

/// Hands out local ids in order, wrapping at the end of the range.
#[derive(Debug)]
pub struct TagAllocator {
    range: TagRange,
    next: Mutex<u32>,
}

impl TagAllocator {
    pub fn new(range: TagRange) -> Self {
        Self {
            range,
            next: Mutex::new(range.first),
        }
    }

    /// Returns the next id.
    pub fn next_id(&self) -> u32 {
        let mut next = self.next.lock();
        let id = *next;
        *next = if id >= self.range.last {
            self.range.first
        } else {
            id + 1
        };
        id
    }

    pub fn range(&self) -> TagRange {
        self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_wraps() {
        let tags = TagAllocator::new(TagRange::new(10, 12));
        let ids: Vec<u32> = (0..5).map(|_| tags.next_id()).collect();
        assert_eq!(ids, vec![10, 11, 12, 10, 11]);
    }

    #[test]
    fn test_default_layout_classification() {
        let layout = TagLayout::default();
        assert_eq!(layout.classify(1_000_001), TagClass::Local);
        assert_eq!(layout.classify(2_000_000), TagClass::Local);
        assert_eq!(layout.classify(7), TagClass::Remote);
        assert_eq!(layout.classify(2_500_000), TagClass::Remote);
        assert_eq!(layout.classify(0), TagClass::Unknown);
        assert_eq!(layout.classify(3_000_001), TagClass::Unknown);
    }

    #[test]
    fn test_overlap() {
        assert!(LOCAL_TAGS.overlaps(&TagRange::new(2_000_000, 2_000_010)));
        assert!(!LOCAL_TAGS.overlaps(&ENGINE_TAGS));
        assert!(!LOCAL_TAGS.overlaps(&TagRange::new(5, 1)));
    }
}
