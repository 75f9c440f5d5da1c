use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::cache::{CacheStats, PositionCache};
use crate::events::{EventStore, SatelliteEvent};
use crate::orbit::OrbitComputation;
use crate::position::{ObserverLocation, SatellitePosition};
use crate::service::command::{CommandService, CommandStats};
use crate::service::query::{QueryService, QueryStats};
use crate::service::{ServiceConfig, ServiceError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct MaintenanceStats {
    pub sweeps: u64,
    pub failures: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub last_purged_positions: usize,
    pub last_trimmed_events: usize,
}

/// Diagnostic snapshot; counters are read without a global lock and may be
/// slightly out of step with each other.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ServiceStats {
    pub running: bool,
    pub commands: CommandStats,
    pub queries: QueryStats,
    pub cache: CacheStats,
    pub event_count: usize,
    pub max_events: usize,
    pub maintenance: MaintenanceStats,
}

#[derive(Debug)]
struct MaintenanceHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Composes the command and query sides and owns the maintenance task.
///
/// Reads go to the query side first; only a miss falls through to a
/// computation on the command side.
pub struct SatellitePositionService {
    commands: Arc<CommandService>,
    queries: Arc<QueryService>,
    cache: Arc<PositionCache>,
    events: Arc<EventStore>,
    config: ServiceConfig,
    maintenance_stats: Arc<Mutex<MaintenanceStats>>,
    worker: Mutex<Option<MaintenanceHandle>>,
}

impl SatellitePositionService {
    pub fn new(orbit: Arc<dyn OrbitComputation>, config: ServiceConfig) -> Self {
        let cache = Arc::new(PositionCache::new(config.position_ttl, config.max_positions));
        let events = Arc::new(EventStore::new(config.max_events));
        let commands = Arc::new(
            CommandService::new(orbit, cache.clone(), events.clone())
                .with_max_trajectory_points(config.max_trajectory_points),
        );
        let queries = Arc::new(QueryService::new(cache.clone(), events.clone()));

        Self {
            commands,
            queries,
            cache,
            events,
            config,
            maintenance_stats: Arc::new(Mutex::new(MaintenanceStats::default())),
            worker: Mutex::new(None),
        }
    }

    pub fn commands(&self) -> &CommandService {
        &self.commands
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Spawns the periodic maintenance task. Must be called from within a
    /// Tokio runtime. Calling it twice is a no-op.
    pub fn start(&self) {
        let cache = self.cache.clone();
        let events = self.events.clone();
        self.spawn_maintenance(Arc::new(move || SweepReport {
            purged_positions: cache.purge_stale(),
            trimmed_events: events.trim(),
        }));
    }

    fn spawn_maintenance(&self, sweep: SweepFn) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            log::warn!("satellite position service already started");
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_maintenance_loop(
            sweep,
            self.maintenance_stats.clone(),
            self.config.maintenance_interval,
            self.config.error_backoff,
            stop_rx,
        ));
        *worker = Some(MaintenanceHandle { stop_tx, join });

        log::info!(
            "satellite position service started (ttl {}s, max {} positions, sweep every {:?})",
            self.config.position_ttl.num_seconds(),
            self.config.max_positions,
            self.config.maintenance_interval
        );
    }

    /// Stops the maintenance task and waits for it to finish.
    pub async fn stop(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return;
        };

        let _ = handle.stop_tx.send(());
        match handle.join.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => log::error!("maintenance task ended abnormally: {e}"),
        }
        log::info!("satellite position service stopped");
    }

    /// Cached position if fresh, otherwise computed and cached.
    pub async fn get_satellite_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
    ) -> Result<Arc<SatellitePosition>, ServiceError> {
        if let Some(position) = self.queries.get_satellite_position(satellite_id, observer) {
            return Ok(position);
        }
        self.commands
            .update_satellite_position(satellite_id, observer, false)
            .await
    }

    pub async fn update_satellite_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
        force: bool,
    ) -> Result<Arc<SatellitePosition>, ServiceError> {
        self.commands
            .update_satellite_position(satellite_id, observer, force)
            .await
    }

    pub async fn batch_update_positions(
        &self,
        satellite_ids: &[u32],
        observer: Option<&ObserverLocation>,
    ) -> Result<Vec<Arc<SatellitePosition>>, ServiceError> {
        self.commands
            .batch_update_positions(satellite_ids, observer)
            .await
    }

    pub fn get_multiple_satellite_positions(
        &self,
        satellite_ids: &[u32],
        observer: Option<&ObserverLocation>,
    ) -> Vec<Arc<SatellitePosition>> {
        self.queries
            .get_multiple_satellite_positions(satellite_ids, observer)
    }

    pub fn find_satellites_in_range(
        &self,
        center: &ObserverLocation,
        radius_km: f64,
        max_results: usize,
    ) -> Result<Vec<Arc<SatellitePosition>>, ServiceError> {
        self.queries
            .find_satellites_in_range(center, radius_km, max_results)
    }

    pub async fn calculate_orbit_propagation(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Arc<SatellitePosition>>, ServiceError> {
        self.commands
            .calculate_orbit_propagation(satellite_id, start, end, step)
            .await
    }

    pub fn get_satellite_trajectory(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Arc<SatellitePosition>> {
        self.queries.get_satellite_trajectory(satellite_id, start, end)
    }

    pub fn get_satellite_events(
        &self,
        satellite_id: u32,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<SatelliteEvent>> {
        self.queries.get_satellite_events(satellite_id, since, limit)
    }

    pub fn invalidate_satellite_cache(&self, satellite_id: u32) -> usize {
        self.commands.invalidate_satellite_cache(satellite_id)
    }

    pub fn apply_tle_update(&self, satellite_id: u32, name: &str, created: bool) -> usize {
        self.commands.apply_tle_update(satellite_id, name, created)
    }

    pub fn get_service_stats(&self) -> ServiceStats {
        ServiceStats {
            running: self.is_running(),
            commands: self.commands.stats(),
            queries: self.queries.stats(),
            cache: self.cache.stats(),
            event_count: self.events.len(),
            max_events: self.events.max_events(),
            maintenance: *self.maintenance_stats.lock(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SweepReport {
    purged_positions: usize,
    trimmed_events: usize,
}

/// One maintenance pass. Runs on its own task; a panic counts as a failed
/// sweep.
type SweepFn = Arc<dyn Fn() -> SweepReport + Send + Sync>;

async fn run_maintenance_loop(
    sweep: SweepFn,
    stats: Arc<Mutex<MaintenanceStats>>,
    interval: StdDuration,
    error_backoff: StdDuration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut delay = interval;

    loop {
        let should_stop = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = &mut stop_rx => true,
        };
        if should_stop {
            break;
        }

        let pass = sweep.clone();
        let outcome = tokio::spawn(async move { pass() }).await;

        let mut record = stats.lock();
        match outcome {
            Ok(report) => {
                log::debug!(
                    "maintenance sweep: purged {} stale positions, trimmed {} events",
                    report.purged_positions,
                    report.trimmed_events
                );
                record.sweeps += 1;
                record.last_sweep_at = Some(Utc::now());
                record.last_purged_positions = report.purged_positions;
                record.last_trimmed_events = report.trimmed_events;
                delay = interval;
            }
            Err(e) => {
                log::error!("maintenance sweep failed: {e}; retrying in {error_backoff:?}");
                record.failures += 1;
                delay = error_backoff;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{position_at, ScriptedOrbit};

    fn service(orbit: Arc<ScriptedOrbit>) -> SatellitePositionService {
        SatellitePositionService::new(
            orbit,
            ServiceConfig {
                maintenance_interval: StdDuration::from_secs(60),
                ..ServiceConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn read_through_computes_only_on_miss() {
        let orbit = Arc::new(ScriptedOrbit::new());
        let svc = service(orbit.clone());

        let first = svc.get_satellite_position(42, None).await.unwrap();
        let second = svc.get_satellite_position(42, None).await.unwrap();

        assert_eq!(orbit.calls(42), 1);
        assert_eq!(first.timestamp, second.timestamp);
    }

    #[tokio::test]
    async fn invalidation_forces_recompute_on_next_read() {
        let orbit = Arc::new(ScriptedOrbit::new());
        let svc = service(orbit.clone());

        svc.get_satellite_position(1, None).await.unwrap();
        svc.invalidate_satellite_cache(1);

        assert!(svc.queries().get_satellite_position(1, None).is_none());
        svc.get_satellite_position(1, None).await.unwrap();
        assert_eq!(orbit.calls(1), 2);
    }

    #[tokio::test]
    async fn upstream_errors_reach_the_caller() {
        let orbit = Arc::new(ScriptedOrbit::new());
        orbit.fail_for(5);
        let svc = service(orbit);

        assert!(matches!(
            svc.get_satellite_position(5, None).await,
            Err(ServiceError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn stats_merge_all_components() {
        let orbit = Arc::new(ScriptedOrbit::new());
        let svc = service(orbit);

        svc.get_satellite_position(1, None).await.unwrap();
        svc.get_satellite_position(1, None).await.unwrap();

        let stats = svc.get_service_stats();
        assert!(!stats.running);
        assert_eq!(stats.queries.cache_hits, 1);
        assert_eq!(stats.queries.cache_misses, 1);
        assert_eq!(stats.commands.positions_calculated, 1);
        assert_eq!(stats.cache.current_entries, 1);
        assert_eq!(stats.event_count, 1);
    }

    #[tokio::test]
    async fn scenario_range_search_after_seeding() {
        let orbit = Arc::new(ScriptedOrbit::new());
        orbit.place(10, 0.0, 0.0, 0.0);
        orbit.place(20, 0.0, 1.0, 0.0);
        let svc = service(orbit);

        svc.batch_update_positions(&[10, 20], None).await.unwrap();

        let center = ObserverLocation::new(0.0, 0.0, None).unwrap();
        let found = svc.find_satellites_in_range(&center, 150.0, 10).unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.satellite_id).collect();
        assert_eq!(ids, vec![10, 20]);
        assert!((found[1].range_km.unwrap() - 111.19).abs() < 0.1);
    }

    #[tokio::test]
    async fn event_history_is_time_ordered() {
        let orbit = Arc::new(ScriptedOrbit::new());
        let svc = service(orbit);

        for _ in 0..5 {
            svc.update_satellite_position(3, None, true).await.unwrap();
        }
        let start = Utc::now();
        svc.calculate_orbit_propagation(3, start, start + Duration::minutes(1), Duration::seconds(30))
            .await
            .unwrap();

        let events = svc.get_satellite_events(3, None, 100);
        assert_eq!(events.len(), 6);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_purges_stale_positions() {
        let orbit = Arc::new(ScriptedOrbit::new());
        let svc = service(orbit);
        svc.cache.set_current_position(Arc::new(position_at(
            1,
            0.0,
            0.0,
            Utc::now() - Duration::minutes(10),
        )));

        svc.start();
        assert!(svc.is_running());

        tokio::time::sleep(StdDuration::from_secs(61)).await;

        let stats = svc.get_service_stats();
        assert_eq!(stats.maintenance.sweeps, 1);
        assert_eq!(stats.maintenance.last_purged_positions, 1);
        assert_eq!(stats.cache.current_entries, 0);

        svc.stop().await;
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let svc = service(Arc::new(ScriptedOrbit::new()));
        svc.stop().await;
        svc.start();
        svc.start();
        svc.stop().await;
        svc.stop().await;
        assert!(!svc.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sweep_backs_off_and_keeps_running() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let svc = SatellitePositionService::new(
            Arc::new(ScriptedOrbit::new()),
            ServiceConfig {
                maintenance_interval: StdDuration::from_secs(60),
                error_backoff: StdDuration::from_secs(10),
                ..ServiceConfig::default()
            },
        );
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = passes.clone();
        svc.spawn_maintenance(Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("sweep blew up");
            }
            SweepReport {
                purged_positions: 0,
                trimmed_events: 0,
            }
        }));

        tokio::time::sleep(StdDuration::from_secs(61)).await;
        let stats = svc.get_service_stats().maintenance;
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.sweeps, 0);
        assert!(svc.is_running());

        // Retried after the backoff, not the full interval.
        tokio::time::sleep(StdDuration::from_secs(10)).await;
        let stats = svc.get_service_stats().maintenance;
        assert_eq!(passes.load(Ordering::SeqCst), 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.sweeps, 1);
        assert!(svc.is_running());

        svc.stop().await;
        assert!(!svc.is_running());
    }
}
