mod store;
mod types;

pub use store::{EventStore, DEFAULT_MAX_EVENTS};
pub use types::{EventPayload, EventType, SatelliteEvent, BATCH_SATELLITE_ID};
