//! Sharded In-Memory Keyspace
//!
//! Keys are spread over independently locked shards, each a `HashMap` from
//! key to [`Entry`]. Expiry is lazy: an expired entry is invisible to every
//! read and is dropped the next time its key is written.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{Duration, Instant};

/// Number of shards. 64 keeps contention low without much overhead.
const NUM_SHARDS: usize = 64;

/// The value held by a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    String(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    List(VecDeque<Bytes>),
    /// Member to score
    ZSet(HashMap<Bytes, f64>),
}

impl Data {
    /// Name reported by `TYPE`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::String(_) => "string",
            Data::Hash(_) => "hash",
            Data::List(_) => "list",
            Data::ZSet(_) => "zset",
        }
    }

    /// Collections disappear once their last element is removed.
    fn is_empty_collection(&self) -> bool {
        match self {
            Data::String(_) => false,
            Data::Hash(h) => h.is_empty(),
            Data::List(l) => l.is_empty(),
            Data::ZSet(z) => z.is_empty(),
        }
    }
}

/// A stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    pub data: Data,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            expires_at: None,
        }
    }

    pub fn with_ttl(data: Data, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }

    /// Remaining time to live, `None` when the entry never expires.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// The keyspace.
#[derive(Debug)]
pub struct Store {
    shards: Vec<Shard>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Runs `f` on the live entry for `key`, if any, under a read lock.
    pub fn read<R>(&self, key: &[u8], f: impl FnOnce(Option<&Entry>) -> R) -> R {
        let data = self.shard(key).data.read();
        f(data.get(key).filter(|entry| !entry.is_expired()))
    }

    /// Runs `f` on the slot for `key` under a write lock.
    ///
    /// The slot is `None` for missing and expired keys. Whatever `f` leaves in
    /// the slot is stored back; empty collections are removed.
    pub fn update<R>(&self, key: &Bytes, f: impl FnOnce(&mut Option<Entry>) -> R) -> R {
        let mut data = self.shard(key).data.write();
        let mut slot = data.remove(key).filter(|entry| !entry.is_expired());
        let result = f(&mut slot);
        if let Some(entry) = slot {
            if !entry.data.is_empty_collection() {
                data.insert(key.clone(), entry);
            }
        }
        result
    }

    /// Stores `entry` under `key`, replacing any previous value.
    pub fn insert(&self, key: Bytes, entry: Entry) {
        self.shard(&key).data.write().insert(key, entry);
    }

    /// Removes `key`, returning the live entry it held.
    pub fn remove(&self, key: &[u8]) -> Option<Entry> {
        self.shard(key)
            .data
            .write()
            .remove(key)
            .filter(|entry| !entry.is_expired())
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.read(key, |entry| entry.is_some())
    }

    /// Returns every live key matching the glob `pattern`.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let mut result = Vec::new();
        for shard in &self.shards {
            let data = shard.data.read();
            for (key, entry) in data.iter() {
                if !entry.is_expired() && glob_match(pattern, key) {
                    result.push(key.clone());
                }
            }
        }
        result
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .data
                    .read()
                    .values()
                    .filter(|entry| !entry.is_expired())
                    .count()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.data.write().clear();
        }
    }
}

/// Glob matching as `KEYS` understands it: `*`, `?`, `[abc]`, `[^a]`,
/// `[a-z]` and `\` escapes.
///
/// Only the most recent `*` is ever retried, so the work is bounded by the
/// pattern length times the text length.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Pattern index after the last `*` and the text index it resumes from
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if pattern.get(p) == Some(&b'*') {
            p += 1;
            star = Some((p, t));
            continue;
        }

        if let Some(next) = match_one(pattern, p, text[t]) {
            p = next;
            t += 1;
            continue;
        }

        match star {
            Some((after, from)) => {
                p = after;
                t = from + 1;
                star = Some((after, t));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Matches the single pattern token at `p` against `c`, returning the index of
/// the next token.
fn match_one(pattern: &[u8], p: usize, c: u8) -> Option<usize> {
    match *pattern.get(p)? {
        b'?' => Some(p + 1),
        b'[' => match_class(pattern, p, c),
        b'\\' if p + 1 < pattern.len() => (pattern[p + 1] == c).then_some(p + 2),
        literal => (literal == c).then_some(p + 1),
    }
}

fn match_class(pattern: &[u8], start: usize, c: u8) -> Option<usize> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            i += 1;
            matched |= pattern[i] == c;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = (pattern[i].min(pattern[i + 2]), pattern[i].max(pattern[i + 2]));
            matched |= (lo..=hi).contains(&c);
            i += 2;
        } else {
            matched |= pattern[i] == c;
        }
        i += 1;
    }

    // Unterminated class
    if i >= pattern.len() {
        return None;
    }
    (matched != negate).then_some(i + 1)
}
