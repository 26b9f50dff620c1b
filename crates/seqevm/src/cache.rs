//! Sharded, reference-counted LRU cache for pre-analyzed bytecode.
//!
//! Decoding a contract is expensive and identical code shows up constantly,
//! so analyzed payloads are cached across transactions keyed by code hash.
//! Shards bound lock contention; a per-entry reference count protects
//! payloads that a concurrent borrower still holds from eviction. Recency is
//! approximated by the block heights of the last four borrows: the idle
//! entry with the lowest height sum inside a short scan stride is evicted.

use primitives::{HashMap, B256};
use std::sync::Mutex;

const SHARD_COUNT: usize = 16;
const STRIDE_SIZE: usize = 10;

/// Cache configuration, owned by whatever process hosts the engine.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Entry bound of one shard; exceeding it triggers an eviction scan.
    pub max_shard_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_shard_size: 100 }
    }
}

#[derive(Debug)]
struct CacheEntry<P> {
    payload: P,
    // heights of the four most recent borrows, newest first
    heights: [u32; 4],
    // borrowers currently holding the payload; non-zero bars eviction
    refs: u32,
}

#[derive(Debug, Default)]
struct Shard<P> {
    entries: HashMap<B256, CacheEntry<P>>,
}

/// Cache of analyzed bytecode, shared by concurrently running transactions.
#[derive(Debug)]
pub struct AnalysisCache<P> {
    shards: Vec<Mutex<Shard<P>>>,
    max_shard_size: usize,
}

impl<P: Clone> AnalysisCache<P> {
    /// Creates an empty cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| {
                    Mutex::new(Shard {
                        entries: HashMap::default(),
                    })
                })
                .collect(),
            max_shard_size: config.max_shard_size,
        }
    }

    fn shard(&self, key: &B256) -> &Mutex<Shard<P>> {
        &self.shards[key[31] as usize % SHARD_COUNT]
    }

    /// Looks up the payload for `key` and marks the entry in use. A miss
    /// returns `None`; the caller performs the analysis and should
    /// [`add`](Self::add) the result. Each hit must eventually be paired
    /// with one [`give_back`](Self::give_back).
    pub fn borrow(&self, key: &B256) -> Option<P> {
        let mut shard = self.shard(key).lock().unwrap();
        if !shard.entries.contains_key(key) {
            return None;
        }
        let entry = shard.entries.get_mut(key).unwrap();
        if entry.refs == 0 {
            // the newest slot is reserved until the borrow is returned
            entry.heights.rotate_right(1);
            entry.heights[0] = 0;
        }
        entry.refs += 1;
        let payload = entry.payload.clone();
        if shard.entries.len() > self.max_shard_size {
            evict_one(&mut shard.entries, key);
        }
        Some(payload)
    }

    /// Returns a borrow taken at `height`. When the last borrower returns,
    /// the entry becomes evictable again and `height` enters its recency
    /// history.
    pub fn give_back(&self, key: &B256, height: u32) {
        let mut shard = self.shard(key).lock().unwrap();
        if let Some(entry) = shard.entries.get_mut(key) {
            if entry.refs > 0 {
                entry.refs -= 1;
                if entry.refs == 0 {
                    entry.heights[0] = height;
                }
            }
        }
    }

    /// Inserts a freshly analyzed payload, with its whole recency history
    /// pre-filled with `height`. Existing entries are left untouched.
    pub fn add(&self, key: B256, payload: P, height: u32) {
        let mut shard = self.shard(&key).lock().unwrap();
        shard.entries.entry(key).or_insert(CacheEntry {
            payload,
            heights: [height; 4],
            refs: 0,
        });
    }

    /// Total number of cached entries across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap().entries.len())
            .sum()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scans a fixed stride of entries starting just past `after`, wrapping
/// around, and evicts the idle entry with the lowest height sum. In-use
/// entries are skipped; ties keep the earlier candidate.
fn evict_one<P>(entries: &mut HashMap<B256, CacheEntry<P>>, after: &B256) {
    let mut victim: Option<(B256, u64)> = None;
    let tail = entries.iter().skip_while(|(key, _)| *key != after).skip(1);
    for (key, entry) in tail.chain(entries.iter()).take(STRIDE_SIZE) {
        if entry.refs > 0 {
            continue;
        }
        let score: u64 = entry.heights.iter().map(|&h| h as u64).sum();
        if victim.is_none_or(|(_, best)| score < best) {
            victim = Some((*key, score));
        }
    }
    if let Some((key, _)) = victim {
        entries.remove(&key);
    }
}
