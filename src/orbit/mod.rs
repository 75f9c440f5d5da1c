//! Orbit computation boundary.
//!
//! The services only see the [`OrbitComputation`] trait. [`Sgp4Orbit`] is the
//! bundled implementation, propagating TLEs loaded into a [`TleCatalog`].

mod catalog;
mod error;
pub mod geodesy;
mod sgp4_orbit;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::position::ObserverLocation;

pub use catalog::{parse_multi_tle, TleCatalog, TleEntry};
pub use error::OrbitError;
pub use sgp4_orbit::Sgp4Orbit;
pub use types::{OrbitFix, OrbitPoint, OrbitTrack};

#[cfg(test)]
pub(crate) use catalog::tests::{ISS_LINE1, ISS_LINE2, ISS_NAME};

#[async_trait]
pub trait OrbitComputation: Send + Sync {
    /// Position now, with topocentric quantities when `observer` is given.
    async fn get_current_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
    ) -> Result<OrbitFix, OrbitError>;

    async fn propagate_orbit(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<OrbitTrack, OrbitError>;
}
