use std::fmt;

use chrono::{DateTime, Utc};

use crate::position::ObserverLocation;

pub const GLOBAL_OBSERVER: &str = "global";

/// Bounded-cardinality key for observer-scoped cache entries.
pub fn observer_fingerprint(observer: Option<&ObserverLocation>) -> String {
    match observer {
        Some(o) => format!(
            "{:.6},{:.6},{:.1}",
            o.latitude_deg,
            o.longitude_deg,
            o.altitude_m.unwrap_or(0.0)
        ),
        None => GLOBAL_OBSERVER.to_string(),
    }
}

/// Whole minutes since the Unix epoch.
pub fn minute_bucket(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp().div_euclid(60)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverKey {
    pub satellite_id: u32,
    pub fingerprint: String,
}

impl ObserverKey {
    pub fn new(satellite_id: u32, observer: Option<&ObserverLocation>) -> Self {
        Self {
            satellite_id,
            fingerprint: observer_fingerprint(observer),
        }
    }
}

/// Ordered by bucket first so the oldest historical entry sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistoricalKey {
    pub bucket: i64,
    pub satellite_id: u32,
}

impl HistoricalKey {
    pub fn new(satellite_id: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            bucket: minute_bucket(timestamp),
            satellite_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BatchKey {
    /// A set of satellites seen by one observer during one minute.
    Positions {
        digest: String,
        observer: String,
        bucket: i64,
    },
    /// A propagated trajectory over a fixed time range.
    Orbit {
        satellite_id: u32,
        start: String,
        end: String,
    },
}

impl BatchKey {
    /// Order and duplicates in `satellite_ids` do not affect the key.
    pub fn positions(
        satellite_ids: &[u32],
        observer: Option<&ObserverLocation>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut ids = satellite_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let digest = blake3::hash(joined.as_bytes()).to_hex()[..16].to_string();

        BatchKey::Positions {
            digest,
            observer: observer_fingerprint(observer),
            bucket: minute_bucket(at),
        }
    }

    pub fn orbit(satellite_id: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        BatchKey::Orbit {
            satellite_id,
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        }
    }

    pub fn is_orbit(&self) -> bool {
        matches!(self, BatchKey::Orbit { .. })
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKey::Positions {
                digest,
                observer,
                bucket,
            } => write!(f, "batch_{digest}_{observer}_{bucket}"),
            BatchKey::Orbit {
                satellite_id,
                start,
                end,
            } => write!(f, "orbit_{satellite_id}_{start}_{end}"),
        }
    }
}
