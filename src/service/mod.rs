//! Command/query split over the shared position cache and event store.

mod command;
mod config;
mod error;
mod facade;
mod query;

pub use command::{CommandService, CommandStats};
pub use config::{
    ServiceConfig, DEFAULT_ERROR_BACKOFF, DEFAULT_MAINTENANCE_INTERVAL,
    DEFAULT_MAX_TRAJECTORY_POINTS,
};
pub use error::ServiceError;
pub use facade::{MaintenanceStats, SatellitePositionService, ServiceStats};
pub use query::{QueryService, QueryStats};
