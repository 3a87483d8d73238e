//! Segment size lookup boundary.
//!
//! The origin-side scraper that maps segment filenames to byte sizes lives
//! outside this crate; the parser only needs a lookup it can call at the
//! moment a segment completes.

use std::collections::HashMap;

/// Maps a segment filename to its size in bytes, when known.
///
/// Called from the parser at segment completion; implementations must be safe
/// under concurrent callers. When no lookup is supplied, byte and throughput
/// metrics for segments are simply not produced.
pub trait SegmentSizeLookup: Send + Sync {
    fn segment_size(&self, filename: &str) -> Option<u64>;
}

/// Immutable filename→size table, for tests and callers that pre-scrape the
/// origin once.
#[derive(Debug, Default, Clone)]
pub struct StaticSizeTable {
    sizes: HashMap<String, u64>,
}

impl StaticSizeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, bytes: u64) {
        self.sizes.insert(filename.into(), bytes);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

impl FromIterator<(String, u64)> for StaticSizeTable {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        Self {
            sizes: iter.into_iter().collect(),
        }
    }
}

impl SegmentSizeLookup for StaticSizeTable {
    fn segment_size(&self, filename: &str) -> Option<u64> {
        self.sizes.get(filename).copied()
    }
}
