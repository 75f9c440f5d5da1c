use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use utoipa::ToSchema;

use crate::position::{BatchKey, HistoricalKey, ObserverKey, ObserverLocation, SatellitePosition};

pub const DEFAULT_POSITION_TTL_SECS: i64 = 30;
pub const DEFAULT_MAX_POSITIONS: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub updates: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub current_entries: usize,
    pub observer_entries: usize,
    pub historical_entries: usize,
    pub batch_entries: usize,
    pub total_entries: usize,
    pub max_positions: usize,
    pub ttl_seconds: i64,
}

struct BatchEntry {
    positions: Vec<Arc<SatellitePosition>>,
    cached_at: DateTime<Utc>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    updates: u64,
    evictions: u64,
}

#[derive(Default)]
struct Maps {
    current: HashMap<u32, Arc<SatellitePosition>>,
    observer: HashMap<ObserverKey, Arc<SatellitePosition>>,
    historical: BTreeMap<HistoricalKey, Arc<SatellitePosition>>,
    batch: HashMap<BatchKey, BatchEntry>,
    counters: Counters,
}

impl Maps {
    fn total(&self) -> usize {
        self.current.len() + self.observer.len() + self.historical.len() + self.batch.len()
    }

    fn record(&mut self, hit: bool) {
        if hit {
            self.counters.hits += 1;
        } else {
            self.counters.misses += 1;
        }
    }
}

/// Multi-tier satellite position cache.
///
/// Four maps behind one coarse lock: latest position per satellite,
/// latest per (satellite, observer), per-minute history, and batch/trajectory
/// results. Freshness is checked at read time against the entry's own
/// timestamp; the background sweep only reclaims memory.
///
/// Size is bounded by evicting the oldest *historical* entries. Current,
/// observer and batch entries are never evicted for space.
pub struct PositionCache {
    ttl: Duration,
    max_positions: usize,
    maps: Mutex<Maps>,
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_POSITION_TTL_SECS),
            DEFAULT_MAX_POSITIONS,
        )
    }
}

impl PositionCache {
    pub fn new(ttl: Duration, max_positions: usize) -> Self {
        Self {
            ttl,
            max_positions: max_positions.max(1),
            maps: Mutex::new(Maps::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    /// Fresh position for the satellite, scoped to `observer` when given.
    pub fn get_current_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
    ) -> Option<Arc<SatellitePosition>> {
        let now = Utc::now();
        let mut maps = self.maps.lock();

        let entry = match observer {
            Some(_) => maps
                .observer
                .get(&ObserverKey::new(satellite_id, observer))
                .cloned(),
            None => maps.current.get(&satellite_id).cloned(),
        };
        let fresh = entry.filter(|p| p.is_fresh(self.ttl, now));
        maps.record(fresh.is_some());
        fresh
    }

    /// Latest stored position regardless of age. Does not touch hit/miss stats.
    pub fn peek(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
    ) -> Option<Arc<SatellitePosition>> {
        let maps = self.maps.lock();
        match observer {
            Some(_) => maps
                .observer
                .get(&ObserverKey::new(satellite_id, observer))
                .cloned(),
            None => maps.current.get(&satellite_id).cloned(),
        }
    }

    /// Writes the current, observer-scoped (if the position carries an
    /// observer) and historical entries in one critical section.
    pub fn set_current_position(&self, position: Arc<SatellitePosition>) {
        let mut maps = self.maps.lock();
        let id = position.satellite_id;

        maps.current.insert(id, position.clone());
        if let Some(observer) = position.observer.as_ref() {
            maps.observer
                .insert(ObserverKey::new(id, Some(observer)), position.clone());
        }
        maps.historical
            .insert(HistoricalKey::new(id, position.timestamp), position);
        maps.counters.updates += 1;

        self.evict_locked(&mut maps);
    }

    /// Position recorded during the minute containing `timestamp`.
    pub fn get_historical_position(
        &self,
        satellite_id: u32,
        timestamp: DateTime<Utc>,
    ) -> Option<Arc<SatellitePosition>> {
        let mut maps = self.maps.lock();
        let entry = maps
            .historical
            .get(&HistoricalKey::new(satellite_id, timestamp))
            .cloned();
        maps.record(entry.is_some());
        entry
    }

    /// Positions batches expire with the TTL; orbit batches do not.
    pub fn get_batch_positions(&self, key: &BatchKey) -> Option<Vec<Arc<SatellitePosition>>> {
        let now = Utc::now();
        let mut maps = self.maps.lock();
        let entry = maps
            .batch
            .get(key)
            .filter(|e| key.is_orbit() || now - e.cached_at <= self.ttl)
            .map(|e| e.positions.clone());
        maps.record(entry.is_some());
        entry
    }

    pub fn set_batch_positions(&self, key: BatchKey, positions: Vec<Arc<SatellitePosition>>) {
        let mut maps = self.maps.lock();
        maps.batch.insert(
            key,
            BatchEntry {
                positions,
                cached_at: Utc::now(),
            },
        );
        maps.counters.updates += 1;

        self.evict_locked(&mut maps);
    }

    /// Removes every entry referring to the satellite from all four maps.
    /// Returns the number of entries removed.
    pub fn invalidate_satellite(&self, satellite_id: u32) -> usize {
        let mut maps = self.maps.lock();
        let before = maps.total();

        maps.current.remove(&satellite_id);
        maps.observer.retain(|k, _| k.satellite_id != satellite_id);
        maps.historical.retain(|k, _| k.satellite_id != satellite_id);
        maps.batch.retain(|k, entry| match k {
            BatchKey::Orbit {
                satellite_id: id, ..
            } => *id != satellite_id,
            BatchKey::Positions { .. } => entry
                .positions
                .iter()
                .all(|p| p.satellite_id != satellite_id),
        });

        before - maps.total()
    }

    /// Snapshot of the current-position map. The lock is released before
    /// the caller does anything with the result.
    pub fn current_snapshot(&self) -> Vec<Arc<SatellitePosition>> {
        self.maps.lock().current.values().cloned().collect()
    }

    /// Drops stale current, observer-scoped and positions-batch entries.
    /// Returns the number of entries removed.
    pub fn purge_stale(&self) -> usize {
        let now = Utc::now();
        let ttl = self.ttl;
        let mut maps = self.maps.lock();
        let before = maps.total();

        maps.current.retain(|_, p| p.is_fresh(ttl, now));
        maps.observer.retain(|_, p| p.is_fresh(ttl, now));
        maps.batch
            .retain(|k, e| k.is_orbit() || now - e.cached_at <= ttl);

        before - maps.total()
    }

    pub fn len(&self) -> usize {
        self.maps.lock().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let maps = self.maps.lock();
        let requests = maps.counters.hits + maps.counters.misses;
        let hit_rate = if requests == 0 {
            0.0
        } else {
            maps.counters.hits as f64 / requests as f64
        };

        CacheStats {
            hits: maps.counters.hits,
            misses: maps.counters.misses,
            updates: maps.counters.updates,
            evictions: maps.counters.evictions,
            hit_rate,
            current_entries: maps.current.len(),
            observer_entries: maps.observer.len(),
            historical_entries: maps.historical.len(),
            batch_entries: maps.batch.len(),
            total_entries: maps.total(),
            max_positions: self.max_positions,
            ttl_seconds: self.ttl.num_seconds(),
        }
    }

    fn evict_locked(&self, maps: &mut Maps) {
        while maps.total() > self.max_positions {
            if maps.historical.pop_first().is_none() {
                log::debug!(
                    "position cache at {} entries (max {}), nothing evictable",
                    maps.total(),
                    self.max_positions
                );
                break;
            }
            maps.counters.evictions += 1;
        }
    }
}
