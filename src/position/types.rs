use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::service::ServiceError;

/// Geographic location of a ground observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ObserverLocation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: Option<f64>,
}

impl ObserverLocation {
    pub fn new(
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_m: Option<f64>,
    ) -> Result<Self, ServiceError> {
        if !latitude_deg.is_finite() || !(-90.0..=90.0).contains(&latitude_deg) {
            return Err(ServiceError::InvalidArgument(format!(
                "observer latitude {latitude_deg} outside [-90, 90]"
            )));
        }
        if !longitude_deg.is_finite() || !(-180.0..=180.0).contains(&longitude_deg) {
            return Err(ServiceError::InvalidArgument(format!(
                "observer longitude {longitude_deg} outside [-180, 180]"
            )));
        }
        if let Some(alt) = altitude_m {
            if !alt.is_finite() {
                return Err(ServiceError::InvalidArgument(
                    "observer altitude must be finite".into(),
                ));
            }
        }
        Ok(Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        })
    }

    /// Parses `"lat,lon"` or `"lat,lon,alt_m"`.
    pub fn from_coordinates(coordinates: &str) -> Result<Self, ServiceError> {
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(ServiceError::InvalidArgument(format!(
                "expected 'lat,lon[,alt_m]', got '{coordinates}'"
            )));
        }
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| ServiceError::InvalidArgument(format!("invalid number '{s}'")))
        };
        let lat = parse(parts[0])?;
        let lon = parse(parts[1])?;
        let alt = parts.get(2).map(|s| parse(s)).transpose()?;
        Self::new(lat, lon, alt)
    }

    pub fn altitude_km(&self) -> f64 {
        self.altitude_m.unwrap_or(0.0) / 1000.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f64; 3]> for Velocity {
    fn from(v: [f64; 3]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
        }
    }
}

/// A computed satellite position. Never mutated once stored; updates
/// replace the shared reference wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SatellitePosition {
    pub satellite_id: u32,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    /// ECEF velocity in km/s.
    pub velocity_km_s: Velocity,
    pub elevation_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
    pub range_km: Option<f64>,
    pub is_visible: Option<bool>,
    pub observer: Option<ObserverLocation>,
}

impl SatellitePosition {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.timestamp <= ttl
    }

    /// Copy of this position with topocentric quantities seen from `observer`.
    pub fn with_topocentric(
        &self,
        observer: ObserverLocation,
        elevation_deg: f64,
        azimuth_deg: f64,
        range_km: f64,
    ) -> Self {
        Self {
            elevation_deg: Some(elevation_deg),
            azimuth_deg: Some(azimuth_deg),
            range_km: Some(range_km),
            is_visible: Some(elevation_deg >= 0.0),
            observer: Some(observer),
            ..self.clone()
        }
    }
}
