use chrono::{DateTime, Utc};

use crate::position::Velocity;

/// A satellite's position at one instant, as computed by an orbit provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitFix {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub velocity_km_s: Velocity,
    pub elevation_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
    pub range_km: Option<f64>,
    pub visible: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub velocity_km_s: Velocity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitTrack {
    pub name: String,
    pub points: Vec<OrbitPoint>,
}
