//! Persistent cache of detected segment ranges.
//!
//! Entries are keyed by a content key derived from the media URL and its
//! duration, so replaying a title picks up the previously detected ranges
//! immediately. The whole cache is stored as one JSON object:
//! `{ "<key>": { "intro": [...], "credits": [...], "ts": <unix ms> } }`,
//! by default in `~/.cache/autoskip/segments.json`.

use crate::error::{AutoskipError, Result};
use crate::ranges::SegmentRanges;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Identity of a title for caching purposes: `"<source>::<duration>"` with the
/// duration rounded to one decimal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key. `None` while either the source or the duration is
/// unknown; callers must then neither read nor write the cache.
pub fn content_key(source: Option<&str>, duration: f64) -> Option<ContentKey> {
    let source = source.filter(|s| !s.is_empty())?;
    if !duration.is_finite() {
        return None;
    }
    let rounded = (duration * 10.0).round() / 10.0;
    Some(ContentKey(format!("{}::{}", source, rounded)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub ranges: SegmentRanges,
    /// Last write, Unix milliseconds.
    #[serde(rename = "ts", default)]
    pub last_write: u64,
}

/// In-memory view of the cache with oldest-first eviction.
#[derive(Debug, Clone)]
pub struct SegmentCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
}

impl SegmentCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn read(&self, key: &ContentKey) -> Option<SegmentRanges> {
        self.entries.get(key.as_str()).map(|e| e.ranges.clone())
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Entries sorted newest first.
    pub fn entries(&self) -> Vec<(&str, &CacheEntry)> {
        let mut list: Vec<_> = self.entries.iter().map(|(k, e)| (k.as_str(), e)).collect();
        list.sort_by(|a, b| b.1.last_write.cmp(&a.1.last_write).then_with(|| a.0.cmp(b.0)));
        list
    }

    /// Insert or overwrite an entry stamped with `timestamp` (Unix ms).
    /// Ranges without any interval are not stored.
    pub fn write(&mut self, key: &ContentKey, ranges: &SegmentRanges, timestamp: u64) {
        if ranges.is_empty() {
            return;
        }

        self.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                ranges: ranges.clone(),
                last_write: timestamp,
            },
        );
        self.evict(Some(key.as_str()));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop the oldest entries beyond the cap. `keep` (the entry just
    /// written) is never a candidate, even when its timestamp ties.
    fn evict(&mut self, keep: Option<&str>) {
        if self.entries.len() <= self.max_entries {
            return;
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|(k, _)| Some(k.as_str()) != keep)
            .map(|(k, e)| (e.last_write, k.clone()))
            .collect();
        by_age.sort();

        let excess = self.entries.len() - self.max_entries;
        for (_, key) in by_age.into_iter().take(excess) {
            debug!("evicting cached segments for {}", key);
            self.entries.remove(&key);
        }
    }

    /// Parse a stored blob. Corrupt JSON, a non-object document or malformed
    /// entries never fail; they are dropped.
    pub fn from_json(blob: &str, max_entries: usize) -> Self {
        let mut cache = Self::new(max_entries);

        let document: HashMap<String, Value> = match serde_json::from_str(blob) {
            Ok(map) => map,
            Err(e) => {
                warn!("segment cache is unreadable, starting empty: {}", e);
                return cache;
            }
        };

        for (key, value) in document {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    cache.entries.insert(key, entry);
                }
                Err(e) => debug!("dropping malformed cache entry {}: {}", key, e),
            }
        }
        cache.evict(None);
        cache
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    /// Load from a store; an absent or unreadable blob yields an empty cache.
    pub fn load(store: &dyn CacheStore, max_entries: usize) -> Self {
        match store.load() {
            Ok(Some(blob)) => Self::from_json(&blob, max_entries),
            Ok(None) => Self::new(max_entries),
            Err(e) => {
                warn!("cannot read segment cache: {}", e);
                Self::new(max_entries)
            }
        }
    }

    pub fn save(&self, store: &mut dyn CacheStore) -> Result<()> {
        store.save(&self.to_json()?)
    }
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

/// Durable key-value slot holding the serialized cache.
pub trait CacheStore {
    fn load(&self) -> Result<Option<String>>;
    fn save(&mut self, blob: &str) -> Result<()>;
}

/// Best-effort `~/.cache` directory.
fn cache_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache"))
}

/// Return the default cache file path (`~/.cache/autoskip/segments.json`).
pub fn default_cache_path() -> Result<PathBuf> {
    cache_dir()
        .map(|dir| dir.join("autoskip").join("segments.json"))
        .ok_or(AutoskipError::NoHomeDir)
}

/// Cache blob in a file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for FileStore {
    fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, blob: &str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(blob.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

/// Cache blob held in memory, for tests and hosts with their own storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blob: Option<String>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: &str) -> Self {
        Self {
            blob: Some(blob.to_string()),
            saves: 0,
        }
    }

    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    /// Number of completed saves.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.blob.clone())
    }

    fn save(&mut self, blob: &str) -> Result<()> {
        self.blob = Some(blob.to_string());
        self.saves += 1;
        Ok(())
    }
}

impl<S: CacheStore + ?Sized> CacheStore for std::rc::Rc<std::cell::RefCell<S>> {
    fn load(&self) -> Result<Option<String>> {
        self.borrow().load()
    }

    fn save(&mut self, blob: &str) -> Result<()> {
        self.borrow_mut().save(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::Interval;

    fn intro_only(start: f64, end: f64) -> SegmentRanges {
        SegmentRanges {
            intro: vec![Interval::new(start, end)],
            credits: Vec::new(),
        }
    }

    fn key(n: usize) -> ContentKey {
        content_key(Some(&format!("https://cdn.example/ep{}.m3u8", n)), 1440.0).expect("key")
    }

    #[test]
    fn test_content_key() {
        let k = content_key(Some("https://cdn.example/ep1.mp4"), 1439.96).expect("key");
        assert_eq!(k.as_str(), "https://cdn.example/ep1.mp4::1440");
        let k = content_key(Some("file.mkv"), 1440.44).expect("key");
        assert_eq!(k.as_str(), "file.mkv::1440.4");
        assert_eq!(content_key(None, 1440.0), None);
        assert_eq!(content_key(Some(""), 1440.0), None);
        assert_eq!(content_key(Some("file.mkv"), f64::NAN), None);
    }

    #[test]
    fn test_write_and_read() {
        let mut cache = SegmentCache::default();
        cache.write(&key(1), &intro_only(85.0, 145.0), 10);
        assert_eq!(cache.read(&key(1)), Some(intro_only(85.0, 145.0)));
        assert_eq!(cache.read(&key(2)), None);

        // Overwrite keeps one entry and refreshes the timestamp.
        cache.write(&key(1), &intro_only(80.0, 140.0), 20);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entry(key(1).as_str()).map(|e| e.last_write), Some(20));
    }

    #[test]
    fn test_empty_ranges_are_not_written() {
        let mut cache = SegmentCache::default();
        cache.write(&key(1), &SegmentRanges::new(), 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut cache = SegmentCache::new(50);
        // Timestamps deliberately not in insertion order.
        for n in 0..51 {
            let ts = 1_000 + ((n * 37) % 51) as u64;
            cache.write(&key(n), &intro_only(1.0, 60.0), ts);
        }
        assert_eq!(cache.len(), 50);
        // n = 0 carries the smallest timestamp.
        assert_eq!(cache.read(&key(0)), None);
        assert!(cache.read(&key(1)).is_some());
    }

    #[test]
    fn test_eviction_keeps_latest_write_on_tie() {
        let mut cache = SegmentCache::new(2);
        let named = |name: &str| content_key(Some(name), 1440.0).expect("key");
        for name in ["m", "n", "a"] {
            cache.write(&named(name), &intro_only(1.0, 60.0), 5);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.read(&named("a")).is_some());
    }

    #[test]
    fn test_json_round_trip_layout() {
        let mut cache = SegmentCache::default();
        cache.write(&key(1), &intro_only(85.0, 145.0), 1234);
        let blob = cache.to_json().expect("serialize");

        let doc: Value = serde_json::from_str(&blob).expect("valid json");
        let entry = &doc[key(1).as_str()];
        assert_eq!(entry["ts"], 1234);
        assert_eq!(entry["intro"][0]["start"], 85.0);
        assert_eq!(entry["credits"].as_array().map(|a| a.len()), Some(0));

        let reloaded = SegmentCache::from_json(&blob, 50);
        assert_eq!(reloaded.read(&key(1)), Some(intro_only(85.0, 145.0)));
    }

    #[test]
    fn test_corrupt_blob_is_empty_cache() {
        assert!(SegmentCache::from_json("{not json", 50).is_empty());
        assert!(SegmentCache::from_json("[1, 2, 3]", 50).is_empty());
        assert!(SegmentCache::from_json("\"text\"", 50).is_empty());
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let blob = r#"{
            "good::1440": { "intro": [{ "start": 1, "end": 60 }], "ts": 5 },
            "bad::1440": { "intro": "nope", "ts": 6 },
            "worse::1440": 17
        }"#;
        let cache = SegmentCache::from_json(blob, 50);
        assert_eq!(cache.len(), 1);
        assert!(cache.entry("good::1440").is_some());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("segments.json");
        let mut store = FileStore::new(&path);
        assert_eq!(store.load().expect("load"), None);

        let mut cache = SegmentCache::default();
        cache.write(&key(3), &intro_only(0.0, 90.0), 99);
        cache.save(&mut store).expect("save");

        let reloaded = SegmentCache::load(&store, 50);
        assert_eq!(reloaded.read(&key(3)), Some(intro_only(0.0, 90.0)));
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let mut store = MemoryStore::new();
        let cache = SegmentCache::default();
        cache.save(&mut store).expect("save");
        cache.save(&mut store).expect("save");
        assert_eq!(store.saves(), 2);
        assert_eq!(store.blob(), Some("{}"));
    }
}
