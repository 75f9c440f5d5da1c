use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::cache::{DEFAULT_MAX_POSITIONS, DEFAULT_POSITION_TTL_SECS};
use crate::events::DEFAULT_MAX_EVENTS;

pub const DEFAULT_MAINTENANCE_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);
pub const DEFAULT_ERROR_BACKOFF: StdDuration = StdDuration::from_secs(60);
pub const DEFAULT_MAX_TRAJECTORY_POINTS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub position_ttl: Duration,
    pub max_positions: usize,
    pub max_events: usize,
    pub maintenance_interval: StdDuration,
    /// Delay before the next sweep after a failed one.
    pub error_backoff: StdDuration,
    /// Upper bound on samples in one orbit propagation request.
    pub max_trajectory_points: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            position_ttl: Duration::seconds(DEFAULT_POSITION_TTL_SECS),
            max_positions: DEFAULT_MAX_POSITIONS,
            max_events: DEFAULT_MAX_EVENTS,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            max_trajectory_points: DEFAULT_MAX_TRAJECTORY_POINTS,
        }
    }
}
