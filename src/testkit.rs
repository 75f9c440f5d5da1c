//! Test doubles shared across module tests.

use std::collections::{HashMap, HashSet};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::orbit::{OrbitComputation, OrbitError, OrbitFix, OrbitPoint, OrbitTrack};
use crate::position::{ObserverLocation, SatellitePosition, Velocity};

/// Orbit provider with scripted positions, failures and latencies.
#[derive(Default)]
pub struct ScriptedOrbit {
    calls: Mutex<HashMap<u32, usize>>,
    propagations: Mutex<usize>,
    failing: Mutex<HashSet<u32>>,
    delays: Mutex<HashMap<u32, StdDuration>>,
    places: Mutex<HashMap<u32, (f64, f64, f64)>>,
    visibility: Mutex<HashMap<u32, bool>>,
}

impl ScriptedOrbit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, satellite_id: u32) {
        self.failing.lock().insert(satellite_id);
    }

    pub fn delay_for(&self, satellite_id: u32, delay: StdDuration) {
        self.delays.lock().insert(satellite_id, delay);
    }

    pub fn place(&self, satellite_id: u32, latitude_deg: f64, longitude_deg: f64, altitude_km: f64) {
        self.places
            .lock()
            .insert(satellite_id, (latitude_deg, longitude_deg, altitude_km));
    }

    pub fn set_visible(&self, satellite_id: u32, visible: bool) {
        self.visibility.lock().insert(satellite_id, visible);
    }

    pub fn calls(&self, satellite_id: u32) -> usize {
        self.calls.lock().get(&satellite_id).copied().unwrap_or(0)
    }

    pub fn propagations(&self) -> usize {
        *self.propagations.lock()
    }

    fn place_of(&self, satellite_id: u32) -> (f64, f64, f64) {
        self.places
            .lock()
            .get(&satellite_id)
            .copied()
            .unwrap_or(((satellite_id % 90) as f64, 0.0, 550.0))
    }

    fn check(&self, satellite_id: u32) -> Result<(), OrbitError> {
        if self.failing.lock().contains(&satellite_id) {
            Err(OrbitError::UnknownSatellite(satellite_id))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrbitComputation for ScriptedOrbit {
    async fn get_current_position(
        &self,
        satellite_id: u32,
        observer: Option<&ObserverLocation>,
    ) -> Result<OrbitFix, OrbitError> {
        *self.calls.lock().entry(satellite_id).or_insert(0) += 1;

        let delay = self.delays.lock().get(&satellite_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(satellite_id)?;

        let (lat, lon, alt) = self.place_of(satellite_id);
        let visible = observer.map(|_| {
            self.visibility
                .lock()
                .get(&satellite_id)
                .copied()
                .unwrap_or(true)
        });

        Ok(OrbitFix {
            name: format!("SAT-{satellite_id}"),
            timestamp: Utc::now(),
            latitude_deg: lat,
            longitude_deg: lon,
            altitude_km: alt,
            velocity_km_s: Velocity {
                x: 7.5,
                y: 0.0,
                z: 0.0,
            },
            elevation_deg: visible.map(|v| if v { 45.0 } else { -10.0 }),
            azimuth_deg: observer.map(|_| 180.0),
            range_km: observer.map(|_| 800.0),
            visible,
        })
    }

    async fn propagate_orbit(
        &self,
        satellite_id: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<OrbitTrack, OrbitError> {
        *self.propagations.lock() += 1;
        self.check(satellite_id)?;

        let (lat, lon, alt) = self.place_of(satellite_id);
        let mut points = Vec::new();
        let mut cursor = start;
        let mut i = 0.0;
        while cursor <= end {
            points.push(OrbitPoint {
                timestamp: cursor,
                latitude_deg: lat,
                longitude_deg: lon + i,
                altitude_km: alt,
                velocity_km_s: Velocity::default(),
            });
            i += 1.0;
            match cursor.checked_add_signed(step) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        Ok(OrbitTrack {
            name: format!("SAT-{satellite_id}"),
            points,
        })
    }
}

pub fn position_at(
    satellite_id: u32,
    latitude_deg: f64,
    longitude_deg: f64,
    timestamp: DateTime<Utc>,
) -> SatellitePosition {
    SatellitePosition {
        satellite_id,
        name: format!("SAT-{satellite_id}"),
        timestamp,
        latitude_deg,
        longitude_deg,
        altitude_km: 0.0,
        velocity_km_s: Velocity::default(),
        elevation_deg: None,
        azimuth_deg: None,
        range_km: None,
        is_visible: None,
        observer: None,
    }
}
