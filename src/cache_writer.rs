//! Debounced persistence of detected ranges.
//!
//! The audio detector can revise its proposal every half second. Instead of
//! serializing the whole cache each time, writes are coalesced: the first
//! scheduled write arms a deadline, later writes before the deadline only
//! replace the pending payload. The session flushes synchronously when it
//! ends, so the last proposal is not lost.

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::ranges::SegmentRanges;
use crate::segment_cache::{CacheStore, ContentKey, FileStore, SegmentCache};
use crate::settings::Settings;
use log::{debug, warn};
use std::time::{Duration, Instant};

pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
struct PendingWrite {
    key: ContentKey,
    ranges: SegmentRanges,
}

pub struct CacheWriter {
    cache: SegmentCache,
    store: Box<dyn CacheStore>,
    clock: Box<dyn Clock>,
    delay: Duration,
    pending: Option<PendingWrite>,
    deadline: Option<Instant>,
}

impl CacheWriter {
    /// Load the cache from `store` and prepare to write back to it.
    pub fn open(
        store: Box<dyn CacheStore>,
        clock: Box<dyn Clock>,
        max_entries: usize,
        delay: Duration,
    ) -> Self {
        let cache = SegmentCache::load(store.as_ref(), max_entries);
        debug!("segment cache loaded with {} entries", cache.len());
        Self {
            cache,
            store,
            clock,
            delay,
            pending: None,
            deadline: None,
        }
    }

    /// Open the file-backed cache named by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = FileStore::new(settings.cache_path()?);
        Ok(Self::open(
            Box::new(store),
            Box::new(SystemClock),
            settings.cache_max_entries(),
            settings.write_delay(),
        ))
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }

    /// Read through any pending write for the same key.
    pub fn read(&self, key: &ContentKey) -> Option<SegmentRanges> {
        match &self.pending {
            Some(p) if &p.key == key => Some(p.ranges.clone()),
            _ => self.cache.read(key),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Queue `ranges` for `key`. Empty ranges are ignored.
    pub fn schedule(&mut self, key: &ContentKey, ranges: &SegmentRanges) {
        if ranges.is_empty() {
            return;
        }

        if let Some(p) = &self.pending {
            if &p.key != key {
                // A different title is pending; do not let it be overwritten.
                self.flush_logged();
            }
        }

        self.pending = Some(PendingWrite {
            key: key.clone(),
            ranges: ranges.clone(),
        });
        if self.deadline.is_none() {
            self.deadline = Some(self.clock.now() + self.delay);
        }
    }

    /// Flush if the debounce deadline has passed. Returns true on a flush.
    pub fn tick(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if self.clock.now() >= deadline => {
                self.flush_logged();
                true
            }
            _ => false,
        }
    }

    /// Write the pending payload, if any, and persist the cache now.
    pub fn flush(&mut self) -> Result<()> {
        self.deadline = None;
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        self.cache
            .write(&pending.key, &pending.ranges, self.clock.unix_millis());
        self.cache.save(self.store.as_mut())?;
        debug!("segments cached for {}: {}", pending.key, pending.ranges);
        Ok(())
    }

    fn flush_logged(&mut self) {
        if let Err(e) = self.flush() {
            warn!("failed to save segment cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ranges::Interval;
    use crate::segment_cache::{content_key, MemoryStore};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ranges(end: f64) -> SegmentRanges {
        SegmentRanges {
            intro: vec![Interval::new(0.0, end)],
            credits: Vec::new(),
        }
    }

    fn writer() -> (CacheWriter, Rc<RefCell<MemoryStore>>, Rc<ManualClock>) {
        let store = Rc::new(RefCell::new(MemoryStore::new()));
        let clock = Rc::new(ManualClock::default());
        let writer = CacheWriter::open(
            Box::new(store.clone()),
            Box::new(clock.clone()),
            50,
            DEFAULT_WRITE_DELAY,
        );
        (writer, store, clock)
    }

    #[test]
    fn test_writes_are_coalesced() {
        let (mut writer, store, clock) = writer();
        let key = content_key(Some("ep1"), 1440.0).expect("key");

        writer.schedule(&key, &ranges(60.0));
        clock.advance(Duration::from_millis(500));
        writer.schedule(&key, &ranges(70.0));
        assert!(!writer.tick());
        assert_eq!(store.borrow().saves(), 0);

        // The deadline was armed by the first schedule and is not pushed back.
        clock.advance(Duration::from_millis(1000));
        assert!(writer.tick());
        assert_eq!(store.borrow().saves(), 1);
        assert_eq!(writer.cache().read(&key), Some(ranges(70.0)));
        assert!(!writer.tick());
    }

    #[test]
    fn test_flush_writes_immediately() {
        let (mut writer, store, _clock) = writer();
        let key = content_key(Some("ep1"), 1440.0).expect("key");

        writer.schedule(&key, &ranges(60.0));
        writer.flush().expect("flush");
        assert_eq!(store.borrow().saves(), 1);
        assert!(!writer.has_pending());

        // Nothing pending: no further saves.
        writer.flush().expect("flush");
        assert_eq!(store.borrow().saves(), 1);
    }

    #[test]
    fn test_empty_ranges_are_ignored() {
        let (mut writer, _store, _clock) = writer();
        let key = content_key(Some("ep1"), 1440.0).expect("key");
        writer.schedule(&key, &SegmentRanges::new());
        assert!(!writer.has_pending());
    }

    #[test]
    fn test_switching_keys_flushes_previous() {
        let (mut writer, store, _clock) = writer();
        let first = content_key(Some("ep1"), 1440.0).expect("key");
        let second = content_key(Some("ep2"), 1440.0).expect("key");

        writer.schedule(&first, &ranges(60.0));
        writer.schedule(&second, &ranges(80.0));
        assert_eq!(store.borrow().saves(), 1);
        assert_eq!(writer.cache().read(&first), Some(ranges(60.0)));
        assert_eq!(writer.read(&second), Some(ranges(80.0)));
    }

    #[test]
    fn test_loads_existing_blob() {
        let blob = r#"{"ep1::1440": {"intro": [{"start": 0, "end": 90}], "credits": [], "ts": 1}}"#;
        let store = MemoryStore::with_blob(blob);
        let writer = CacheWriter::open(
            Box::new(store),
            Box::new(ManualClock::default()),
            50,
            DEFAULT_WRITE_DELAY,
        );
        let key = content_key(Some("ep1"), 1440.0).expect("key");
        assert_eq!(writer.read(&key), Some(ranges(90.0)));
    }
}
