//! Route cache.
//!
//! Keyed by (origin, destination, path kind, graph version). The cache only
//! ever holds entries for a single graph version: a version bump discards
//! everything, and lookups or inserts for an older version miss or are
//! dropped. Bounded by entry count with least-recently-used eviction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::network::NodeId;
use crate::pathfinder::{PathAlgorithm, RouteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Dijkstra,
    AStar,
    /// Alternative paths with the requested count.
    Alternatives(usize),
}

impl From<PathAlgorithm> for PathKind {
    fn from(algorithm: PathAlgorithm) -> Self {
        match algorithm {
            PathAlgorithm::Dijkstra => PathKind::Dijkstra,
            PathAlgorithm::AStar => PathKind::AStar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub origin: NodeId,
    pub destination: NodeId,
    pub kind: PathKind,
    pub version: u64,
}

impl RouteKey {
    pub fn new(origin: &NodeId, destination: &NodeId, kind: PathKind, version: u64) -> Self {
        Self {
            origin: origin.clone(),
            destination: destination.clone(),
            kind,
            version,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub version: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

#[derive(Debug)]
struct Entry {
    routes: Arc<[RouteResult]>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    version: u64,
    entries: HashMap<RouteKey, Entry>,
    /// last_used tick -> key, oldest first.
    recency: BTreeMap<u64, RouteKey>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    invalidations: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn reset(&mut self, version: u64) {
        self.entries.clear();
        self.recency.clear();
        self.version = version;
    }
}

#[derive(Debug)]
pub struct RouteCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl RouteCache {
    /// Creates a cache for graph version 0. Capacity 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self::with_version(capacity, 0)
    }

    pub fn with_version(capacity: usize, version: u64) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState {
                version,
                ..CacheState::default()
            }),
        }
    }

    pub fn get(&self, key: &RouteKey) -> Option<Arc<[RouteResult]>> {
        let mut state = self.lock();
        if key.version != state.version {
            state.misses += 1;
            return None;
        }

        let tick = state.next_tick();
        let CacheState {
            entries,
            recency,
            hits,
            misses,
            ..
        } = &mut *state;
        let Some(entry) = entries.get_mut(key) else {
            *misses += 1;
            return None;
        };
        recency.remove(&entry.last_used);
        entry.last_used = tick;
        recency.insert(tick, key.clone());
        *hits += 1;
        Some(Arc::clone(&entry.routes))
    }

    /// Stores routes computed against `key.version`. Results for a version
    /// older than the cache's are dropped; a newer version resets the cache.
    pub fn put(&self, key: RouteKey, routes: Vec<RouteResult>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.lock();
        if key.version < state.version {
            debug!(version = key.version, current = state.version, "Dropping stale route result");
            return;
        }
        if key.version > state.version {
            state.reset(key.version);
            state.invalidations += 1;
        }

        let tick = state.next_tick();
        if let Some(previous) = state.entries.remove(&key) {
            state.recency.remove(&previous.last_used);
        }
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            Entry {
                routes: routes.into(),
                last_used: tick,
            },
        );

        while state.entries.len() > self.capacity {
            let Some((_, oldest)) = state.recency.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
            state.evictions += 1;
        }
    }

    /// Discards every entry if `version` is newer than the cache's.
    pub fn invalidate(&self, version: u64) {
        let mut state = self.lock();
        if version <= state.version {
            return;
        }
        let dropped = state.entries.len();
        state.reset(version);
        state.invalidations += 1;
        debug!(version, dropped, "Route cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            capacity: self.capacity,
            version: state.version,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            invalidations: state.invalidations,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
