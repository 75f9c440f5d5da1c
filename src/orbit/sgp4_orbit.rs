use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::orbit::catalog::{TleCatalog, TleEntry};
use crate::orbit::error::OrbitError;
use crate::orbit::geodesy::{ecef_to_geodetic, look_angles, teme_to_ecef_position, teme_to_ecef_velocity};
use crate::orbit::types::{OrbitFix, OrbitPoint, OrbitTrack};
use crate::orbit::OrbitComputation;
use crate::position::ObserverLocation;

/// SGP4 propagation over a shared, reloadable TLE catalog.
#[derive(Clone)]
pub struct Sgp4Orbit {
    catalog: Arc<RwLock<TleCatalog>>,
}

impl Sgp4Orbit {
    pub fn new(catalog: TleCatalog) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(catalog)),
        }
    }

    /// Handle for swapping in reloaded element sets.
    pub fn catalog(&self) -> Arc<RwLock<TleCatalog>> {
        self.catalog.clone()
    }

    pub fn fix_at(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
        timestamp: DateTime<Utc>,
    ) -> Result<OrbitFix, OrbitError> {
        let catalog = self.catalog.read();
        let entry = catalog
            .get(satellite_id)
            .ok_or(OrbitError::UnknownSatellite(satellite_id))?;

        let (ecef, velocity) = propagate_ecef(entry, timestamp)?;
        let geo = ecef_to_geodetic(ecef);
        let look = observer.map(|o| look_angles(o, ecef));

        Ok(OrbitFix {
            name: entry.name.clone(),
            timestamp,
            latitude_deg: geo.latitude_deg,
            longitude_deg: geo.longitude_deg,
            altitude_km: geo.altitude_km,
            velocity_km_s: velocity.into(),
            elevation_deg: look.map(|l| round2(l.elevation_deg)),
            azimuth_deg: look.map(|l| round2(l.azimuth_deg)),
            range_km: look.map(|l| round2(l.range_km)),
            visible: look.map(|l| l.elevation_deg >= 0.0),
        })
    }

    /// Samples `[start, end]` inclusive every `step`.
    pub fn track(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<OrbitTrack, OrbitError> {
        if step <= Duration::zero() {
            return Err(OrbitError::Propagation("step must be positive".into()));
        }

        let catalog = self.catalog.read();
        let entry = catalog
            .get(satellite_id)
            .ok_or(OrbitError::UnknownSatellite(satellite_id))?;

        let mut points = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            let (ecef, velocity) = propagate_ecef(entry, cursor)?;
            let geo = ecef_to_geodetic(ecef);
            points.push(OrbitPoint {
                timestamp: cursor,
                latitude_deg: geo.latitude_deg,
                longitude_deg: geo.longitude_deg,
                altitude_km: geo.altitude_km,
                velocity_km_s: velocity.into(),
            });
            match cursor.checked_add_signed(step) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        Ok(OrbitTrack {
            name: entry.name.clone(),
            points,
        })
    }
}

#[async_trait]
impl OrbitComputation for Sgp4Orbit {
    async fn get_current_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
    ) -> Result<OrbitFix, OrbitError> {
        self.fix_at(satellite_id, observer, Utc::now())
    }

    async fn propagate_orbit(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<OrbitTrack, OrbitError> {
        let orbit = self.clone();
        tokio::task::spawn_blocking(move || orbit.track(satellite_id, start, end, step))
            .await
            .map_err(|e| OrbitError::Propagation(format!("propagation task failed: {e}")))?
    }
}

/// ECEF position (km) and velocity (km/s) at `timestamp`.
fn propagate_ecef(
    entry: &TleEntry,
    timestamp: DateTime<Utc>,
) -> Result<([f64; 3], [f64; 3]), OrbitError> {
    let minutes = entry
        .elements
        .datetime_to_minutes_since_epoch(&timestamp.naive_utc())
        .map_err(|e| OrbitError::Propagation(e.to_string()))?;

    let prediction = entry.constants.propagate(minutes)?;

    let sidereal =
        sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&timestamp.naive_utc()));

    Ok((
        teme_to_ecef_position(prediction.position, sidereal),
        teme_to_ecef_velocity(prediction.position, prediction.velocity, sidereal),
    ))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::catalog::tests::{ISS_LINE1, ISS_LINE2, ISS_NAME};

    fn iss() -> (Sgp4Orbit, DateTime<Utc>) {
        let mut catalog = TleCatalog::new();
        catalog
            .insert_tle(Some(ISS_NAME.into()), ISS_LINE1, ISS_LINE2, "test")
            .unwrap();
        let epoch = catalog.get(25544).unwrap().elements.datetime.and_utc();
        (Sgp4Orbit::new(catalog), epoch)
    }

    #[test]
    fn fix_is_in_low_earth_orbit() {
        let (orbit, epoch) = iss();
        let fix = orbit.fix_at(25544, None, epoch).unwrap();

        assert_eq!(fix.name, ISS_NAME);
        assert!(fix.latitude_deg.abs() <= 51.7, "lat {}", fix.latitude_deg);
        assert!((300.0..450.0).contains(&fix.altitude_km), "alt {}", fix.altitude_km);
        let speed = (fix.velocity_km_s.x.powi(2)
            + fix.velocity_km_s.y.powi(2)
            + fix.velocity_km_s.z.powi(2))
        .sqrt();
        assert!((7.0..8.0).contains(&speed), "speed {speed}");
        assert!(fix.elevation_deg.is_none());
    }

    #[test]
    fn fix_with_observer_has_look_angles() {
        let (orbit, epoch) = iss();
        let observer = ObserverLocation::new(25.0, 121.5, Some(50.0)).unwrap();
        let fix = orbit.fix_at(25544, Some(&observer), epoch).unwrap();

        let elevation = fix.elevation_deg.unwrap();
        assert!((-90.0..=90.0).contains(&elevation));
        assert!((0.0..360.0).contains(&fix.azimuth_deg.unwrap()));
        assert!(fix.range_km.unwrap() > 300.0);
        assert_eq!(fix.visible, Some(elevation >= 0.0));
    }

    #[test]
    fn unknown_satellite() {
        let (orbit, epoch) = iss();
        assert!(matches!(
            orbit.fix_at(1, None, epoch),
            Err(OrbitError::UnknownSatellite(1))
        ));
    }

    #[test]
    fn track_is_inclusive() {
        let (orbit, epoch) = iss();
        let track = orbit
            .track(25544, epoch, epoch + Duration::minutes(10), Duration::minutes(1))
            .unwrap();
        assert_eq!(track.points.len(), 11);
        assert_eq!(track.points[10].timestamp, epoch + Duration::minutes(10));

        assert!(orbit
            .track(25544, epoch, epoch, Duration::zero())
            .is_err());
    }

    #[test]
    fn step_past_the_calendar_limit_stops_after_first_point() {
        let (orbit, epoch) = iss();
        let track = orbit
            .track(
                25544,
                epoch,
                epoch + Duration::hours(1),
                Duration::seconds(1_000_000_000_000_000),
            )
            .unwrap();
        assert_eq!(track.points.len(), 1);
        assert_eq!(track.points[0].timestamp, epoch);
    }

    #[tokio::test]
    async fn propagation_runs_off_the_async_worker() {
        let (orbit, epoch) = iss();
        let track = orbit
            .propagate_orbit(25544, epoch, epoch + Duration::minutes(2), Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(track.name, ISS_NAME);
        assert_eq!(track.points.len(), 3);
    }

    #[test]
    fn catalog_handle_updates_are_visible() {
        let orbit = Sgp4Orbit::new(TleCatalog::new());
        let epoch = {
            let catalog = orbit.catalog();
            let mut catalog = catalog.write();
            catalog
                .insert_tle(Some(ISS_NAME.into()), ISS_LINE1, ISS_LINE2, "api")
                .unwrap();
            catalog.get(25544).unwrap().elements.datetime.and_utc()
        };
        assert_eq!(orbit.fix_at(25544, None, epoch).unwrap().name, ISS_NAME);
    }
}
