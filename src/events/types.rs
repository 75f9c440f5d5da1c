use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Subject id used for events that span several satellites.
pub const BATCH_SATELLITE_ID: u32 = 0;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    ToSchema,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PositionUpdated,
    OrbitCalculated,
    VisibilityChanged,
    SatelliteCreated,
    SatelliteUpdated,
    TleUpdated,
    BatchPositionsUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    PositionUpdated {
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_km: f64,
        observer: String,
        forced: bool,
    },
    OrbitCalculated {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_seconds: i64,
        points: usize,
    },
    VisibilityChanged {
        observer: String,
        visible: bool,
        elevation_deg: Option<f64>,
    },
    SatelliteCreated {
        name: String,
    },
    SatelliteUpdated {
        name: String,
    },
    TleUpdated {
        name: Option<String>,
    },
    BatchPositionsUpdated {
        satellite_ids: Vec<u32>,
        observer: String,
        success_count: usize,
        total_count: usize,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PositionUpdated { .. } => EventType::PositionUpdated,
            EventPayload::OrbitCalculated { .. } => EventType::OrbitCalculated,
            EventPayload::VisibilityChanged { .. } => EventType::VisibilityChanged,
            EventPayload::SatelliteCreated { .. } => EventType::SatelliteCreated,
            EventPayload::SatelliteUpdated { .. } => EventType::SatelliteUpdated,
            EventPayload::TleUpdated { .. } => EventType::TleUpdated,
            EventPayload::BatchPositionsUpdated { .. } => EventType::BatchPositionsUpdated,
        }
    }
}

/// An append-only record of something that happened to a satellite.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SatelliteEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub satellite_id: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
    /// Per-satellite sequence number, assigned by the event store on append.
    pub version: u64,
    pub correlation_id: Option<Uuid>,
}

impl SatelliteEvent {
    pub fn new(satellite_id: u32, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: payload.event_type(),
            satellite_id,
            timestamp: Utc::now(),
            payload,
            version: 0,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<Uuid>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
