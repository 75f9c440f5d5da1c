mod keys;
mod types;

pub use keys::{
    minute_bucket, observer_fingerprint, BatchKey, HistoricalKey, ObserverKey, GLOBAL_OBSERVER,
};
pub use types::{ObserverLocation, SatellitePosition, Velocity};
