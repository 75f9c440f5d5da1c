use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use utoipa::ToSchema;

use crate::cache::PositionCache;
use crate::events::{EventStore, SatelliteEvent};
use crate::orbit::geodesy::{great_circle_distance_km, relative_position};
use crate::position::{BatchKey, ObserverLocation, SatellitePosition};
use crate::service::ServiceError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct QueryStats {
    pub queries_processed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Read side. Every lookup is served from the cache or event store and
/// never triggers an orbit computation.
pub struct QueryService {
    cache: Arc<PositionCache>,
    events: Arc<EventStore>,
    stats: Mutex<QueryStats>,
}

impl QueryService {
    pub fn new(cache: Arc<PositionCache>, events: Arc<EventStore>) -> Self {
        Self {
            cache,
            events,
            stats: Mutex::new(QueryStats::default()),
        }
    }

    pub fn stats(&self) -> QueryStats {
        *self.stats.lock()
    }

    fn record(&self, hit: bool) {
        let mut stats = self.stats.lock();
        stats.queries_processed += 1;
        if hit {
            stats.cache_hits += 1;
        } else {
            stats.cache_misses += 1;
        }
    }

    pub fn get_satellite_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
    ) -> Option<Arc<SatellitePosition>> {
        let position = self.cache.get_current_position(satellite_id, observer);
        self.record(position.is_some());
        position
    }

    /// Batch cache first (same key rule as the command side), then one
    /// lookup per id. Ids with no fresh data are left out.
    pub fn get_multiple_satellite_positions(
        &self,
        satellite_ids: &[u32],
        observer: Option<&ObserverLocation>,
    ) -> Vec<Arc<SatellitePosition>> {
        let key = BatchKey::positions(satellite_ids, observer, Utc::now());
        if let Some(positions) = self.cache.get_batch_positions(&key) {
            self.record(true);
            return positions;
        }

        satellite_ids
            .iter()
            .filter_map(|&id| self.get_satellite_position(id, observer))
            .collect()
    }

    /// Fresh current positions within `radius_km` of `center` (inclusive),
    /// enriched with look angles from `center`, nearest first.
    ///
    /// The whole snapshot is scanned before truncating, so the result is
    /// the nearest `max_results`, not just any `max_results` in range.
    pub fn find_satellites_in_range(
        &self,
        center: &ObserverLocation,
        radius_km: f64,
        max_results: usize,
    ) -> Result<Vec<Arc<SatellitePosition>>, ServiceError> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(ServiceError::InvalidArgument(format!(
                "radius must be a non-negative number of km, got {radius_km}"
            )));
        }
        self.stats.lock().queries_processed += 1;

        let ttl = self.cache.ttl();
        let now = Utc::now();
        let snapshot = self.cache.current_snapshot();

        let mut matches: Vec<(f64, SatellitePosition)> = snapshot
            .iter()
            .filter(|p| p.is_fresh(ttl, now))
            .filter(|p| {
                great_circle_distance_km(
                    center.latitude_deg,
                    center.longitude_deg,
                    p.latitude_deg,
                    p.longitude_deg,
                ) <= radius_km
            })
            .map(|p| {
                let rel = relative_position(center, p.latitude_deg, p.longitude_deg, p.altitude_km);
                (
                    rel.range_km,
                    p.with_topocentric(*center, rel.elevation_deg, rel.azimuth_deg, rel.range_km),
                )
            })
            .collect();

        matches.sort_by(|a, b| a.0.total_cmp(&b.0));
        matches.truncate(max_results);

        Ok(matches.into_iter().map(|(_, p)| Arc::new(p)).collect())
    }

    /// Cached trajectory for exactly `[start, end]`; empty until the command
    /// side has propagated that range.
    pub fn get_satellite_trajectory(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Arc<SatellitePosition>> {
        let trajectory = self
            .cache
            .get_batch_positions(&BatchKey::orbit(satellite_id, start, end));
        self.record(trajectory.is_some());
        trajectory.unwrap_or_default()
    }

    pub fn get_historical_position(
        &self,
        satellite_id: u32,
        timestamp: DateTime<Utc>,
    ) -> Option<Arc<SatellitePosition>> {
        let position = self.cache.get_historical_position(satellite_id, timestamp);
        self.record(position.is_some());
        position
    }

    pub fn get_all_current_positions(&self) -> Vec<Arc<SatellitePosition>> {
        self.stats.lock().queries_processed += 1;
        let ttl = self.cache.ttl();
        let now = Utc::now();
        let mut positions: Vec<_> = self
            .cache
            .current_snapshot()
            .into_iter()
            .filter(|p| p.is_fresh(ttl, now))
            .collect();
        positions.sort_by_key(|p| p.satellite_id);
        positions
    }

    pub fn get_satellite_events(
        &self,
        satellite_id: u32,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<SatelliteEvent>> {
        self.stats.lock().queries_processed += 1;
        self.events.get_events_for_satellite(satellite_id, since, limit)
    }
}
