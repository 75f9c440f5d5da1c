//! Satellite position service: an in-process, event-recording, multi-tier
//! position cache split into a command side (computations, cache writes) and
//! a query side (cache-only reads), with a small HTTP host on top.

pub mod cache;
pub mod config;
pub mod events;
pub mod orbit;
pub mod position;
pub mod service;
pub mod web;

#[cfg(test)]
pub(crate) mod testkit;

pub use service::{SatellitePositionService, ServiceConfig, ServiceError};
