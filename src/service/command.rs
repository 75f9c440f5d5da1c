use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cache::PositionCache;
use crate::events::{EventPayload, EventStore, SatelliteEvent, BATCH_SATELLITE_ID};
use crate::orbit::{OrbitComputation, OrbitFix, OrbitPoint};
use crate::position::{observer_fingerprint, BatchKey, ObserverLocation, SatellitePosition};
use crate::service::{ServiceError, DEFAULT_MAX_TRAJECTORY_POINTS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CommandStats {
    pub commands_processed: u64,
    pub positions_calculated: u64,
    pub batch_updates: u64,
    pub orbit_propagations: u64,
    pub invalidations: u64,
    pub errors: u64,
}

/// Write side: computes positions, fills the cache and records events.
pub struct CommandService {
    orbit: Arc<dyn OrbitComputation>,
    cache: Arc<PositionCache>,
    events: Arc<EventStore>,
    max_trajectory_points: usize,
    stats: Mutex<CommandStats>,
}

impl CommandService {
    pub fn new(
        orbit: Arc<dyn OrbitComputation>,
        cache: Arc<PositionCache>,
        events: Arc<EventStore>,
    ) -> Self {
        Self {
            orbit,
            cache,
            events,
            max_trajectory_points: DEFAULT_MAX_TRAJECTORY_POINTS,
            stats: Mutex::new(CommandStats::default()),
        }
    }

    pub fn with_max_trajectory_points(mut self, max_points: usize) -> Self {
        self.max_trajectory_points = max_points;
        self
    }

    pub fn stats(&self) -> CommandStats {
        *self.stats.lock()
    }

    /// Serves from cache unless `force`; otherwise computes, caches and
    /// records a `POSITION_UPDATED` event. Upstream errors leave the cache
    /// untouched.
    pub async fn update_satellite_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
        force: bool,
    ) -> Result<Arc<SatellitePosition>, ServiceError> {
        self.update_position(satellite_id, observer, force, None)
            .await
    }

    async fn update_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
        force: bool,
        correlation_id: Option<Uuid>,
    ) -> Result<Arc<SatellitePosition>, ServiceError> {
        self.stats.lock().commands_processed += 1;

        if !force {
            if let Some(cached) = self.cache.get_current_position(satellite_id, observer) {
                return Ok(cached);
            }
        }

        let previous = observer.and_then(|o| self.cache.peek(satellite_id, Some(o)));

        let fix = match self.orbit.get_current_position(satellite_id, observer).await {
            Ok(fix) => fix,
            Err(e) => {
                self.stats.lock().errors += 1;
                return Err(e.into());
            }
        };

        let position = Arc::new(position_from_fix(satellite_id, observer, fix));
        self.cache.set_current_position(position.clone());

        let fingerprint = observer_fingerprint(observer);
        let recorded = self.events.append(
            SatelliteEvent::new(
                satellite_id,
                EventPayload::PositionUpdated {
                    latitude_deg: position.latitude_deg,
                    longitude_deg: position.longitude_deg,
                    altitude_km: position.altitude_km,
                    observer: fingerprint.clone(),
                    forced: force,
                },
            )
            .with_correlation_id(correlation_id),
        );

        if let (Some(before), Some(now)) = (
            previous.as_ref().and_then(|p| p.is_visible),
            position.is_visible,
        ) {
            if before != now {
                self.events.append(
                    SatelliteEvent::new(
                        satellite_id,
                        EventPayload::VisibilityChanged {
                            observer: fingerprint,
                            visible: now,
                            elevation_deg: position.elevation_deg,
                        },
                    )
                    .with_correlation_id(Some(correlation_id.unwrap_or(recorded.id))),
                );
            }
        }

        self.stats.lock().positions_calculated += 1;
        Ok(position)
    }

    /// Force-updates every id concurrently. Failed ids are dropped from the
    /// result; the batch itself only fails on bad input.
    pub async fn batch_update_positions(
        &self,
        satellite_ids: &[u32],
        observer: Option<&ObserverLocation>,
    ) -> Result<Vec<Arc<SatellitePosition>>, ServiceError> {
        if satellite_ids.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "batch update needs at least one satellite id".into(),
            ));
        }

        let correlation_id = Uuid::new_v4();
        let results = join_all(
            satellite_ids
                .iter()
                .map(|&id| self.update_position(id, observer, true, Some(correlation_id))),
        )
        .await;

        let mut positions = Vec::with_capacity(results.len());
        for (id, result) in satellite_ids.iter().zip(results) {
            match result {
                Ok(position) => positions.push(position),
                Err(e) => log::warn!("batch update: satellite {id} failed: {e}"),
            }
        }

        if !positions.is_empty() {
            let key = BatchKey::positions(satellite_ids, observer, Utc::now());
            self.cache.set_batch_positions(key, positions.clone());
        }

        self.events.append(
            SatelliteEvent::new(
                BATCH_SATELLITE_ID,
                EventPayload::BatchPositionsUpdated {
                    satellite_ids: satellite_ids.to_vec(),
                    observer: observer_fingerprint(observer),
                    success_count: positions.len(),
                    total_count: satellite_ids.len(),
                },
            )
            .with_correlation_id(Some(correlation_id)),
        );

        self.stats.lock().batch_updates += 1;
        Ok(positions)
    }

    /// One upstream propagation over `[start, end]`, cached as a whole under
    /// the orbit key for that range.
    pub async fn calculate_orbit_propagation(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Arc<SatellitePosition>>, ServiceError> {
        if end < start {
            return Err(ServiceError::InvalidArgument(format!(
                "propagation end {end} is before start {start}"
            )));
        }
        if step <= Duration::zero() {
            return Err(ServiceError::InvalidArgument(
                "propagation step must be positive".into(),
            ));
        }
        let points = total_nanos(end - start) / total_nanos(step) + 1;
        if points > self.max_trajectory_points as i128 {
            return Err(ServiceError::InvalidArgument(format!(
                "propagation would produce {points} points, limit is {}",
                self.max_trajectory_points
            )));
        }

        self.stats.lock().commands_processed += 1;

        let track = match self
            .orbit
            .propagate_orbit(satellite_id, start, end, step)
            .await
        {
            Ok(track) => track,
            Err(e) => {
                self.stats.lock().errors += 1;
                return Err(e.into());
            }
        };

        let positions: Vec<_> = track
            .points
            .into_iter()
            .map(|point| Arc::new(position_from_point(satellite_id, &track.name, point)))
            .collect();

        self.cache.set_batch_positions(
            BatchKey::orbit(satellite_id, start, end),
            positions.clone(),
        );

        self.events.append(SatelliteEvent::new(
            satellite_id,
            EventPayload::OrbitCalculated {
                start,
                end,
                step_seconds: step.num_seconds(),
                points: positions.len(),
            },
        ));

        self.stats.lock().orbit_propagations += 1;
        Ok(positions)
    }

    /// Drops cached data for the satellite. Not recorded as an event.
    pub fn invalidate_satellite_cache(&self, satellite_id: u32) -> usize {
        let removed = self.cache.invalidate_satellite(satellite_id);
        let mut stats = self.stats.lock();
        stats.commands_processed += 1;
        stats.invalidations += 1;
        removed
    }

    /// New orbital elements make every cached position for the satellite
    /// obsolete: invalidate, then record `SATELLITE_CREATED` for a satellite
    /// seen for the first time and `TLE_UPDATED` in either case. Both events
    /// share a correlation id. Returns the number of cache entries removed.
    pub fn apply_tle_update(&self, satellite_id: u32, name: &str, created: bool) -> usize {
        let removed = self.invalidate_satellite_cache(satellite_id);
        let correlation_id = Uuid::new_v4();

        if created {
            self.events.append(
                SatelliteEvent::new(
                    satellite_id,
                    EventPayload::SatelliteCreated {
                        name: name.to_string(),
                    },
                )
                .with_correlation_id(Some(correlation_id)),
            );
        }
        self.events.append(
            SatelliteEvent::new(
                satellite_id,
                EventPayload::TleUpdated {
                    name: Some(name.to_string()),
                },
            )
            .with_correlation_id(Some(correlation_id)),
        );

        log::info!("orbital elements updated for satellite {satellite_id} ({name})");
        removed
    }
}

fn total_nanos(duration: Duration) -> i128 {
    duration.num_seconds() as i128 * 1_000_000_000 + duration.subsec_nanos() as i128
}

fn position_from_fix(
    satellite_id: u32,
    observer: Option<&ObserverLocation>,
    fix: OrbitFix,
) -> SatellitePosition {
    SatellitePosition {
        satellite_id,
        name: fix.name,
        timestamp: fix.timestamp,
        latitude_deg: fix.latitude_deg,
        longitude_deg: fix.longitude_deg,
        altitude_km: fix.altitude_km,
        velocity_km_s: fix.velocity_km_s,
        elevation_deg: fix.elevation_deg,
        azimuth_deg: fix.azimuth_deg,
        range_km: fix.range_km,
        is_visible: fix.visible,
        observer: observer.copied(),
    }
}

fn position_from_point(satellite_id: u32, name: &str, point: OrbitPoint) -> SatellitePosition {
    SatellitePosition {
        satellite_id,
        name: name.to_string(),
        timestamp: point.timestamp,
        latitude_deg: point.latitude_deg,
        longitude_deg: point.longitude_deg,
        altitude_km: point.altitude_km,
        velocity_km_s: point.velocity_km_s,
        elevation_deg: None,
        azimuth_deg: None,
        range_km: None,
        is_visible: None,
        observer: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::testkit::ScriptedOrbit;

    struct Fixture {
        orbit: Arc<ScriptedOrbit>,
        cache: Arc<PositionCache>,
        events: Arc<EventStore>,
        commands: CommandService,
    }

    fn fixture() -> Fixture {
        let orbit = Arc::new(ScriptedOrbit::new());
        let cache = Arc::new(PositionCache::default());
        let events = Arc::new(EventStore::default());
        let commands = CommandService::new(orbit.clone(), cache.clone(), events.clone());
        Fixture {
            orbit,
            cache,
            events,
            commands,
        }
    }

    #[tokio::test]
    async fn second_update_within_ttl_is_a_cache_hit() {
        let f = fixture();

        let first = f.commands.update_satellite_position(42, None, false).await.unwrap();
        let second = f.commands.update_satellite_position(42, None, false).await.unwrap();

        assert_eq!(f.orbit.calls(42), 1);
        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(f.events.get_events_for_satellite(42, None, 10).len(), 1);
    }

    #[tokio::test]
    async fn force_always_recomputes_with_newer_timestamp() {
        let f = fixture();

        let first = f.commands.update_satellite_position(7, None, false).await.unwrap();
        let forced = f.commands.update_satellite_position(7, None, true).await.unwrap();

        assert_eq!(f.orbit.calls(7), 2);
        assert!(forced.timestamp >= first.timestamp);
        let cached = f.cache.get_current_position(7, None).unwrap();
        assert!(Arc::ptr_eq(&cached, &forced));
    }

    #[tokio::test]
    async fn upstream_error_propagates_without_cache_write() {
        let f = fixture();
        f.orbit.fail_for(13);

        let err = f
            .commands
            .update_satellite_position(13, None, false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Upstream(crate::orbit::OrbitError::UnknownSatellite(13))
        ));
        assert!(f.cache.is_empty());
        assert!(f.events.is_empty());
        assert_eq!(f.commands.stats().errors, 1);
    }

    #[tokio::test]
    async fn observer_update_fills_observer_and_global_entries() {
        let f = fixture();
        let observer = ObserverLocation::new(25.0, 121.0, None).unwrap();

        let position = f
            .commands
            .update_satellite_position(5, Some(&observer), false)
            .await
            .unwrap();

        assert_eq!(position.observer, Some(observer));
        assert!(f.cache.get_current_position(5, Some(&observer)).is_some());
        assert!(f.cache.get_current_position(5, None).is_some());
    }

    #[tokio::test]
    async fn batch_keeps_successes_in_order() {
        let f = fixture();
        f.orbit.fail_for(2);

        let positions = f
            .commands
            .batch_update_positions(&[1, 2, 3], None)
            .await
            .unwrap();

        let ids: Vec<_> = positions.iter().map(|p| p.satellite_id).collect();
        assert_eq!(ids, vec![1, 3]);

        let batch_events = f.events.get_events_for_satellite(BATCH_SATELLITE_ID, None, 10);
        assert_eq!(batch_events.len(), 1);
        match &batch_events[0].payload {
            EventPayload::BatchPositionsUpdated {
                success_count,
                total_count,
                ..
            } => {
                assert_eq!(*success_count, 2);
                assert_eq!(*total_count, 3);
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let key = BatchKey::positions(&[1, 2, 3], None, Utc::now());
        assert_eq!(f.cache.get_batch_positions(&key).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_members_share_correlation_id() {
        let f = fixture();
        f.commands.batch_update_positions(&[4, 5], None).await.unwrap();

        let batch = &f.events.get_events_for_satellite(BATCH_SATELLITE_ID, None, 1)[0];
        let member = &f.events.get_events_for_satellite(4, None, 1)[0];
        assert!(batch.correlation_id.is_some());
        assert_eq!(member.correlation_id, batch.correlation_id);
    }

    #[tokio::test]
    async fn batch_runs_members_concurrently() {
        tokio::time::pause();
        let f = fixture();
        for id in 1..=3 {
            f.orbit.delay_for(id, std::time::Duration::from_secs(10));
        }

        let started = tokio::time::Instant::now();
        let positions = f.commands.batch_update_positions(&[1, 2, 3], None).await.unwrap();

        assert_eq!(positions.len(), 3);
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.commands.batch_update_positions(&[], None).await,
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn orbit_propagation_is_cached_and_recorded() {
        let f = fixture();
        let start = Utc::now();
        let end = start + Duration::minutes(5);

        let points = f
            .commands
            .calculate_orbit_propagation(9, start, end, Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(points.len(), 6);
        assert_eq!(f.orbit.propagations(), 1);
        let cached = f.cache.get_batch_positions(&BatchKey::orbit(9, start, end)).unwrap();
        assert_eq!(cached.len(), 6);

        let events = f.events.get_events_for_satellite(9, None, 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::OrbitCalculated);
    }

    #[tokio::test]
    async fn orbit_propagation_validates_range() {
        let f = fixture();
        let start = Utc::now();

        let reversed = f
            .commands
            .calculate_orbit_propagation(9, start, start - Duration::minutes(1), Duration::minutes(1))
            .await;
        assert!(matches!(reversed, Err(ServiceError::InvalidArgument(_))));

        let zero_step = f
            .commands
            .calculate_orbit_propagation(9, start, start, Duration::zero())
            .await;
        assert!(matches!(zero_step, Err(ServiceError::InvalidArgument(_))));
        assert_eq!(f.orbit.propagations(), 0);
    }

    #[tokio::test]
    async fn failed_propagation_caches_nothing() {
        let f = fixture();
        f.orbit.fail_for(9);
        let start = Utc::now();

        assert!(f
            .commands
            .calculate_orbit_propagation(9, start, start + Duration::minutes(1), Duration::seconds(10))
            .await
            .is_err());
        assert!(f.cache.is_empty());
        assert!(f.events.is_empty());
    }

    #[tokio::test]
    async fn invalidation_records_no_event() {
        let f = fixture();
        f.commands.update_satellite_position(3, None, false).await.unwrap();
        let before = f.events.len();

        assert!(f.commands.invalidate_satellite_cache(3) > 0);
        assert!(f.cache.get_current_position(3, None).is_none());
        assert_eq!(f.events.len(), before);
    }

    #[tokio::test]
    async fn visibility_flip_is_recorded() {
        let f = fixture();
        let observer = ObserverLocation::new(0.0, 0.0, None).unwrap();

        f.orbit.set_visible(11, true);
        f.commands
            .update_satellite_position(11, Some(&observer), true)
            .await
            .unwrap();
        f.orbit.set_visible(11, false);
        f.commands
            .update_satellite_position(11, Some(&observer), true)
            .await
            .unwrap();

        let types: Vec<_> = f
            .events
            .get_events_for_satellite(11, None, 10)
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(types.len(), 3);
        assert!(types.contains(&EventType::VisibilityChanged));
    }

    #[tokio::test]
    async fn tle_update_invalidates_and_records() {
        let f = fixture();
        f.commands.update_satellite_position(25544, None, false).await.unwrap();

        assert!(f.commands.apply_tle_update(25544, "ISS", false) > 0);

        assert!(f.cache.get_current_position(25544, None).is_none());
        let last = f.events.get_events_for_satellite(25544, None, 1);
        assert_eq!(last[0].event_type, EventType::TleUpdated);
    }

    #[test]
    fn new_satellite_tle_records_creation() {
        let f = fixture();

        assert_eq!(f.commands.apply_tle_update(40000, "NEWSAT", true), 0);

        let events = f.events.get_events_for_satellite(40000, None, 10);
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert!(types.contains(&EventType::SatelliteCreated));
        assert!(types.contains(&EventType::TleUpdated));
        assert!(events.iter().all(|e| e.correlation_id == events[0].correlation_id));
        assert!(events[0].correlation_id.is_some());
    }

    #[tokio::test]
    async fn oversized_propagation_is_rejected_before_upstream() {
        let orbit = Arc::new(ScriptedOrbit::new());
        let commands = CommandService::new(
            orbit.clone(),
            Arc::new(PositionCache::default()),
            Arc::new(EventStore::default()),
        )
        .with_max_trajectory_points(100);
        let start = Utc::now();

        let too_many = commands
            .calculate_orbit_propagation(9, start, start + Duration::days(36_500), Duration::seconds(1))
            .await;
        assert!(matches!(too_many, Err(ServiceError::InvalidArgument(_))));
        assert_eq!(orbit.propagations(), 0);

        let at_limit = commands
            .calculate_orbit_propagation(9, start, start + Duration::seconds(99), Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(at_limit.len(), 100);
    }

    #[tokio::test]
    async fn huge_step_yields_single_point() {
        let f = fixture();
        let start = Utc::now();

        let points = f
            .commands
            .calculate_orbit_propagation(
                9,
                start,
                start + Duration::hours(1),
                Duration::seconds(1_000_000_000_000_000),
            )
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
    }
}
