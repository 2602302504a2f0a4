//! Cover-Art Cache (spec.md §2, §3).
//!
//! A small per-player in-memory byte cache with a fixed TTL and LRU
//! overflow eviction. The embedded default logo doubles as the sentinel
//! URL the Parser falls back to (spec.md §4.5) and as the content served
//! when a cache miss has nothing better to offer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use base64::Engine;

/// 1x1 transparent PNG, embedded so the sentinel never depends on network
/// access (spec.md §9: "Embedded artwork bytes ... are read-only constants").
const EMBEDDED_LOGO_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];

/// TTL for cover-art cache entries (~1h per spec.md §3).
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Max cached entries per player before LRU eviction (spec.md §3).
pub const CACHE_CAPACITY: usize = 10;

/// The sentinel cover-art URL used whenever the device has no usable
/// artwork: the embedded logo, base64-encoded as a `data:` URL so it never
/// depends on a device or network being reachable.
pub fn embedded_logo_url() -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(EMBEDDED_LOGO_PNG)
    )
}

struct Entry {
    key: String,
    bytes: Vec<u8>,
    content_type: String,
    inserted_at: Instant,
}

/// Per-player in-memory cover-art cache: TTL expiry plus LRU eviction at
/// [`CACHE_CAPACITY`] entries.
pub struct CoverArtCache {
    entries: VecDeque<Entry>,
}

impl Default for CoverArtCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverArtCache {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Fetch bytes for `key`, evicting it first if expired. Returns `None`
    /// on a cache miss (caller should re-fetch over HTTP and call `put`).
    pub fn get(&mut self, key: &str) -> Option<(Vec<u8>, String)> {
        self.evict_expired();
        if let Some(pos) = self.entries.iter().position(|e| e.key == key) {
            // LRU: move to back (most-recently-used) on hit.
            let entry = self.entries.remove(pos).expect("position was just found");
            let result = (entry.bytes.clone(), entry.content_type.clone());
            self.entries.push_back(entry);
            Some(result)
        } else {
            None
        }
    }

    pub fn put(&mut self, key: String, bytes: Vec<u8>, content_type: String) {
        self.entries.retain(|e| e.key != key);
        if self.entries.len() >= CACHE_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(Entry {
            key,
            bytes,
            content_type,
            inserted_at: Instant::now(),
        });
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|e| now.duration_since(e.inserted_at) < CACHE_TTL);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The embedded default logo, served as the fallback content for the
    /// sentinel URL.
    pub fn embedded_logo() -> (&'static [u8], &'static str) {
        (EMBEDDED_LOGO_PNG, "image/png")
    }
}
