use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::types::SatelliteEvent;

pub const DEFAULT_MAX_EVENTS: usize = 10_000;

#[derive(Default)]
struct Inner {
    /// Every retained event, in append order.
    events: VecDeque<Arc<SatelliteEvent>>,
    /// Per-satellite index, ascending by timestamp.
    by_satellite: HashMap<u32, Vec<Arc<SatelliteEvent>>>,
    /// Last version handed out per satellite. Survives trimming.
    versions: HashMap<u32, u64>,
}

/// In-memory, bounded, append-only event log.
///
/// One lock guards the whole store for reads and writes. Events are
/// volatile: nothing is persisted and a restart loses the log.
pub struct EventStore {
    inner: Mutex<Inner>,
    max_events: usize,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl EventStore {
    pub fn new(max_events: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_events: max_events.max(1),
        }
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Stores the event, assigning its per-satellite version.
    pub fn append(&self, mut event: SatelliteEvent) -> Arc<SatelliteEvent> {
        let mut inner = self.inner.lock();

        let version = inner.versions.entry(event.satellite_id).or_insert(0);
        *version += 1;
        event.version = *version;

        let event = Arc::new(event);
        inner.events.push_back(event.clone());

        let index = inner.by_satellite.entry(event.satellite_id).or_default();
        let at = index.partition_point(|e| e.timestamp <= event.timestamp);
        index.insert(at, event.clone());

        if inner.events.len() > self.max_events {
            let dropped = trim_oldest(&mut inner);
            log::debug!("event store over capacity, dropped {dropped} oldest events");
        }

        event
    }

    /// The most recent `limit` events for a satellite at or after `since`,
    /// ascending by timestamp.
    pub fn get_events_for_satellite(
        &self,
        satellite_id: u32,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<SatelliteEvent>> {
        let inner = self.inner.lock();
        let Some(index) = inner.by_satellite.get(&satellite_id) else {
            return Vec::new();
        };

        let first = match since {
            Some(since) => index.partition_point(|e| e.timestamp < since),
            None => 0,
        };
        let matching = &index[first..];
        let skip = matching.len().saturating_sub(limit);
        matching[skip..].to_vec()
    }

    /// The most recently appended events across all satellites, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<SatelliteEvent>> {
        let inner = self.inner.lock();
        inner.events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the oldest 10% of events if the store is over capacity.
    /// Returns the number of events dropped.
    pub fn trim(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.events.len() > self.max_events {
            trim_oldest(&mut inner)
        } else {
            0
        }
    }
}

fn trim_oldest(inner: &mut Inner) -> usize {
    let count = (inner.events.len() / 10).max(1);

    // Oldest by timestamp; `events` itself keeps append order.
    let mut by_age: Vec<&Arc<SatelliteEvent>> = inner.events.iter().collect();
    by_age.sort_by_key(|e| e.timestamp);
    let doomed: HashSet<Uuid> = by_age.iter().take(count).map(|e| e.id).collect();

    let mut removed: HashMap<u32, HashSet<Uuid>> = HashMap::new();
    inner.events.retain(|event| {
        if doomed.contains(&event.id) {
            removed.entry(event.satellite_id).or_default().insert(event.id);
            false
        } else {
            true
        }
    });

    for (satellite_id, ids) in removed {
        if let Some(index) = inner.by_satellite.get_mut(&satellite_id) {
            index.retain(|e| !ids.contains(&e.id));
            if index.is_empty() {
                inner.by_satellite.remove(&satellite_id);
            }
        }
    }

    count
}
