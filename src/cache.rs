//! Content-addressed cache of processed static resources.
//!
//! Entries are keyed by resource path, codec and whether the payload was
//! minified. Each entry remembers the SHA-256 fingerprint of the raw bytes it
//! was produced from, so callers can tell when the resource behind a key has
//! changed.

use crate::codec::Codec;
use crate::error::Result;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const META_EXTENSION: &str = "meta";
const PAYLOAD_EXTENSION: &str = "cache";

/// Hex-encoded SHA-256 digest of `data`.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Identity of a processed static resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: String,
    codec: Option<Codec>,
    minified: bool,
}

impl CacheKey {
    /// Creates a key. `path` should already have the static prefix stripped.
    pub fn new(path: impl Into<String>, codec: Option<Codec>, minified: bool) -> Self {
        Self {
            path: path.into(),
            codec,
            minified,
        }
    }

    /// Resource path relative to the static mount.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Codec the payload is encoded with.
    pub fn codec(&self) -> Option<Codec> {
        self.codec
    }

    /// Whether the payload was minified.
    pub fn minified(&self) -> bool {
        self.minified
    }

    /// Flat string form used as map key and on-disk file stem,
    /// e.g. `js%2Fapp.js.gzip.min`.
    pub fn normalized(&self) -> String {
        let mut out = String::with_capacity(self.path.len() + 16);
        for c in self.path.chars() {
            match c {
                '%' => out.push_str("%25"),
                '/' => out.push_str("%2F"),
                c => out.push(c),
            }
        }
        out.push('.');
        out.push_str(self.codec.map_or("none", |codec| codec.content_encoding()));
        out.push('.');
        out.push_str(if self.minified { "min" } else { "raw" });
        out
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

/// A processed payload and the fingerprint of the bytes it was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Fingerprint of the original, unprocessed bytes.
    pub fingerprint: String,
    /// Minified and/or compressed bytes.
    pub payload: Bytes,
}

impl CacheEntry {
    /// Returns true if this entry was produced from bytes with `fingerprint`.
    pub fn matches(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }
}

/// On-disk metadata stored next to each payload file.
#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    fingerprint: String,
    payload_len: usize,
    payload_sha256: String,
}

/// Shared store of processed static resources.
///
/// Safe to share between concurrent requests. Concurrent `put`s for the same
/// key are last-writer-wins. With a directory configured, every `put` is also
/// written to disk and [`FingerprintCache::open`] loads previous entries back.
pub struct FingerprintCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    dir: Option<PathBuf>,
}

impl FingerprintCache {
    /// Creates an empty in-memory cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            dir: None,
        }
    }

    /// Opens a persistent cache in `dir`, creating the directory if needed and
    /// loading every intact entry found there.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let cache = Self {
            entries: DashMap::new(),
            dir: Some(dir),
        };
        cache.hydrate()?;
        Ok(cache)
    }

    /// Directory the cache persists to, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Looks up the entry for `key`.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .get(&key.normalized())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Stores `payload` under `key`, replacing any previous entry.
    ///
    /// When persistent, the entry is also written to disk. Write failures are
    /// logged and otherwise ignored; the in-memory entry is kept.
    pub fn put(&self, key: &CacheKey, fingerprint: String, payload: Bytes) -> Arc<CacheEntry> {
        let stem = key.normalized();
        let entry = Arc::new(CacheEntry {
            fingerprint,
            payload,
        });

        if let Some(dir) = &self.dir {
            if let Err(err) = write_entry(dir, &stem, &entry) {
                tracing::warn!(key = %stem, dir = %dir.display(), error = %err, "failed to persist cache entry");
            }
        }

        self.entries.insert(stem, Arc::clone(&entry));
        entry
    }

    /// Returns true if an entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(&key.normalized())
    }

    /// Number of entries in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every in-memory entry. Files on disk are left alone.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn hydrate(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        for dir_entry in fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(META_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            match read_entry(dir, stem) {
                Ok(Some(entry)) => {
                    self.entries.insert(stem.to_string(), Arc::new(entry));
                }
                Ok(None) => {
                    tracing::debug!(key = %stem, "skipping incomplete cache entry");
                }
                Err(err) => {
                    tracing::debug!(key = %stem, error = %err, "skipping unreadable cache entry");
                }
            }
        }

        tracing::debug!(dir = %dir.display(), entries = self.entries.len(), "cache hydrated");
        Ok(())
    }
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FingerprintCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("entries", &self.entries.len())
            .field("dir", &self.dir)
            .finish()
    }
}

fn file_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    dir.join(format!("{stem}.{extension}"))
}

fn write_entry(dir: &Path, stem: &str, entry: &CacheEntry) -> Result<()> {
    let meta = Meta {
        fingerprint: entry.fingerprint.clone(),
        payload_len: entry.payload.len(),
        payload_sha256: fingerprint(&entry.payload),
    };
    fs::write(file_path(dir, stem, PAYLOAD_EXTENSION), &entry.payload)?;
    fs::write(file_path(dir, stem, META_EXTENSION), serde_json::to_vec(&meta)?)?;
    Ok(())
}

/// Reads one entry back. `Ok(None)` means the pair is incomplete or does not
/// agree with its metadata.
fn read_entry(dir: &Path, stem: &str) -> Result<Option<CacheEntry>> {
    let meta: Meta = serde_json::from_slice(&fs::read(file_path(dir, stem, META_EXTENSION))?)?;

    let payload = match fs::read(file_path(dir, stem, PAYLOAD_EXTENSION)) {
        Ok(payload) => payload,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if payload.len() != meta.payload_len || fingerprint(&payload) != meta.payload_sha256 {
        return Ok(None);
    }

    Ok(Some(CacheEntry {
        fingerprint: meta.fingerprint,
        payload: Bytes::from(payload),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> CacheKey {
        CacheKey::new(path, Some(Codec::Gzip), true)
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }

    #[test]
    fn test_normalized_key() {
        assert_eq!(key("js/app.js").normalized(), "js%2Fapp.js.gzip.min");
        assert_eq!(
            CacheKey::new("100%/x.css", None, false).normalized(),
            "100%25%2Fx.css.none.raw"
        );
        assert_eq!(
            CacheKey::new("a.js", Some(Codec::Brotli), false).normalized(),
            "a.js.br.raw"
        );
        // Escaping keeps distinct paths distinct
        assert_ne!(key("a/b").normalized(), key("a%2Fb").normalized());
    }

    #[test]
    fn test_get_put() {
        let cache = FingerprintCache::new();
        assert!(cache.is_empty());
        assert!(cache.get(&key("app.js")).is_none());

        cache.put(&key("app.js"), fingerprint(b"raw"), Bytes::from_static(b"out"));
        let entry = cache.get(&key("app.js")).unwrap();
        assert!(entry.matches(&fingerprint(b"raw")));
        assert_eq!(&entry.payload[..], b"out");

        assert!(!cache.contains(&CacheKey::new("app.js", Some(Codec::Gzip), false)));
        assert!(!cache.contains(&CacheKey::new("app.js", Some(Codec::Brotli), true)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = FingerprintCache::new();
        cache.put(&key("app.js"), "one".into(), Bytes::from_static(b"1"));
        cache.put(&key("app.js"), "two".into(), Bytes::from_static(b"2"));
        let entry = cache.get(&key("app.js")).unwrap();
        assert_eq!(entry.fingerprint, "two");
        assert_eq!(&entry.payload[..], b"2");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = FingerprintCache::new();
        cache.put(&key("app.js"), "f".into(), Bytes::from_static(b"x"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_persist_and_hydrate() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = FingerprintCache::open(dir.path()).unwrap();
            cache.put(&key("css/site.css"), fingerprint(b"raw"), Bytes::from_static(b"payload"));
        }
        assert!(dir.path().join("css%2Fsite.css.gzip.min.meta").exists());
        assert!(dir.path().join("css%2Fsite.css.gzip.min.cache").exists());

        let cache = FingerprintCache::open(dir.path()).unwrap();
        let entry = cache.get(&key("css/site.css")).unwrap();
        assert_eq!(entry.fingerprint, fingerprint(b"raw"));
        assert_eq!(&entry.payload[..], b"payload");
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = FingerprintCache::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(cache.dir(), Some(nested.as_path()));
    }

    #[test]
    fn test_hydrate_skips_missing_payload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = FingerprintCache::open(dir.path()).unwrap();
            cache.put(&key("a.js"), "f".into(), Bytes::from_static(b"a"));
            cache.put(&key("b.js"), "f".into(), Bytes::from_static(b"b"));
        }
        fs::remove_file(dir.path().join("a.js.gzip.min.cache")).unwrap();

        let cache = FingerprintCache::open(dir.path()).unwrap();
        assert!(!cache.contains(&key("a.js")));
        assert!(cache.contains(&key("b.js")));
    }

    #[test]
    fn test_hydrate_skips_orphan_payload() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.js.gzip.min.cache"), b"x").unwrap();
        let cache = FingerprintCache::open(dir.path()).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hydrate_skips_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = FingerprintCache::open(dir.path()).unwrap();
            cache.put(&key("truncated.js"), "f".into(), Bytes::from_static(b"long payload"));
            cache.put(&key("flipped.js"), "f".into(), Bytes::from_static(b"abcd"));
            cache.put(&key("garbled.js"), "f".into(), Bytes::from_static(b"meta"));
            cache.put(&key("good.js"), "f".into(), Bytes::from_static(b"ok"));
        }
        fs::write(dir.path().join("truncated.js.gzip.min.cache"), b"long").unwrap();
        fs::write(dir.path().join("flipped.js.gzip.min.cache"), b"abce").unwrap();
        fs::write(dir.path().join("garbled.js.gzip.min.meta"), b"{not json").unwrap();

        let cache = FingerprintCache::open(dir.path()).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key("good.js")));
    }

    #[test]
    fn test_write_failure_keeps_memory_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = FingerprintCache::open(&cache_dir).unwrap();
        fs::remove_dir_all(&cache_dir).unwrap();

        cache.put(&key("app.js"), "f".into(), Bytes::from_static(b"x"));
        assert!(cache.contains(&key("app.js")));
    }

    #[test]
    fn test_concurrent_puts() {
        let cache = FingerprintCache::new();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let cache = &cache;
                scope.spawn(move || {
                    for j in 0..50 {
                        let payload = Bytes::from(format!("{i}-{j}"));
                        cache.put(&key("shared.js"), fingerprint(&payload), payload.clone());
                        cache.put(&key(&format!("{i}/{j}.js")), "f".into(), payload);
                        let entry = cache.get(&key("shared.js")).unwrap();
                        assert!(entry.matches(&fingerprint(&entry.payload)));
                    }
                });
            }
        });
        assert_eq!(cache.len(), 8 * 50 + 1);
    }
}
