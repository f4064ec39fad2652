//! Single-flight LRU tier.
//!
//! Waiting is per key, locking is not. One table-wide mutex guards the
//! retained entries and the in-flight map, and is held only for lookups and
//! bookkeeping. Generation always runs outside it, so a slow key never
//! blocks another key. The first caller for a missing key becomes the
//! leader and generates; callers arriving while it runs register a reply
//! channel for that key and block on it until the leader publishes. A
//! leader that unwinds still releases its followers.
//!
//! The table is not sharded: a single LRU keeps eviction order exact across
//! all keys of a tier.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::GenerationError;

type Outcome<V> = Result<Arc<V>, GenerationError>;

/// How a tier satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Served from a retained entry.
    Hit,
    /// Generated by this request.
    Miss,
    /// Joined a generation already in flight.
    Shared,
}

/// Counter snapshot for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub shared: u64,
    pub generations: u64,
    pub failures: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    shared: AtomicU64,
    generations: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Table<K: Hash + Eq, V> {
    /// `None` when the tier retains nothing.
    ready: Option<LruCache<K, Arc<V>>>,
    in_flight: HashMap<K, Vec<Sender<Outcome<V>>>>,
}

/// One cache tier.
pub struct TierCache<K: Hash + Eq, V> {
    name: &'static str,
    capacity: usize,
    table: Mutex<Table<K, V>>,
    counters: Counters,
}

impl<K: Hash + Eq, V> std::fmt::Debug for TierCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

enum Role<V> {
    Leader,
    Follower(Receiver<Outcome<V>>),
}

/// Publishes an abandonment to followers if the leader never completes.
struct Flight<'a, K: Hash + Eq + Clone + Display, V> {
    tier: &'a TierCache<K, V>,
    key: &'a K,
    done: bool,
}

impl<K: Hash + Eq + Clone + Display, V> Drop for Flight<'_, K, V> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        tracing::warn!(tier = self.tier.name, key = %self.key, "generation abandoned");
        self.tier.publish(
            self.key,
            Err(GenerationError::Abandoned {
                key: self.key.to_string(),
            }),
        );
    }
}

impl<K, V> TierCache<K, V>
where
    K: Hash + Eq + Clone + Display,
{
    /// Creates a tier retaining up to `capacity` entries; zero retains none.
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            table: Mutex::new(Table {
                ready: NonZeroUsize::new(capacity).map(LruCache::new),
                in_flight: HashMap::new(),
            }),
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the entry for `key`, generating it at most once concurrently.
    ///
    /// # Errors
    ///
    /// Returns the leader's `GenerationError`, or `GenerationError::Abandoned`
    /// if the leader unwound. Failures are not retained.
    pub fn get_or_generate<F>(&self, key: &K, generate: F) -> Result<(Arc<V>, CacheStatus), GenerationError>
    where
        F: FnOnce() -> Result<V, GenerationError>,
    {
        let role = {
            let mut table = self.table.lock();
            if let Some(hit) = table.ready.as_mut().and_then(|c| c.get(key)) {
                let hit = Arc::clone(hit);
                drop(table);
                bump(&self.counters.hits);
                tracing::debug!(tier = self.name, key = %key, "cache hit");
                return Ok((hit, CacheStatus::Hit));
            }
            match table.in_flight.get_mut(key) {
                Some(waiters) => {
                    let (tx, rx) = bounded(1);
                    waiters.push(tx);
                    Role::Follower(rx)
                }
                None => {
                    table.in_flight.insert(key.clone(), Vec::new());
                    Role::Leader
                }
            }
        };

        if let Role::Follower(rx) = role {
            bump(&self.counters.shared);
            tracing::debug!(tier = self.name, key = %key, "joined in-flight generation");
            return match rx.recv() {
                Ok(outcome) => outcome.map(|v| (v, CacheStatus::Shared)),
                Err(_) => Err(GenerationError::Abandoned { key: key.to_string() }),
            };
        }

        bump(&self.counters.misses);
        tracing::debug!(tier = self.name, key = %key, "cache miss, generating");
        let mut flight = Flight {
            tier: self,
            key,
            done: false,
        };
        let outcome: Outcome<V> = generate().map(Arc::new);
        bump(&self.counters.generations);
        flight.done = true;
        self.publish(key, outcome.clone());
        outcome.map(|v| (v, CacheStatus::Miss))
    }

    fn publish(&self, key: &K, outcome: Outcome<V>) {
        let waiters = {
            let mut table = self.table.lock();
            let waiters = table.in_flight.remove(key).unwrap_or_default();
            if let (Ok(value), Some(ready)) = (&outcome, table.ready.as_mut()) {
                if let Some((evicted, _)) = ready.push(key.clone(), Arc::clone(value)) {
                    if &evicted != key {
                        bump(&self.counters.evictions);
                        tracing::debug!(tier = self.name, evicted = %evicted, "evicted least recently used entry");
                    }
                }
            }
            waiters
        };
        if outcome.is_err() {
            bump(&self.counters.failures);
        }
        for tx in waiters {
            // A follower that went away no longer needs the result.
            let _ = tx.send(outcome.clone());
        }
    }

    /// Returns true if `key` is retained, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        self.table.lock().ready.as_ref().is_some_and(|c| c.contains(key))
    }

    pub fn len(&self) -> usize {
        self.table.lock().ready.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every retained entry. In-flight generations are unaffected.
    pub fn clear(&self) {
        if let Some(ready) = self.table.lock().ready.as_mut() {
            ready.clear();
        }
    }

    pub fn stats(&self) -> TierStats {
        let c = &self.counters;
        TierStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            shared: c.shared.load(Ordering::Relaxed),
            generations: c.generations.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}
