use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::error::ErrorResponse;
use super::api::satellites::{
    BatchRequest, BatchResponse, InvalidateResponse, PropagateRequest, TleUpdateRequest,
    TleUpdateResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::satellites::get_position,
        super::api::satellites::refresh_position,
        super::api::satellites::batch_update,
        super::api::satellites::list_positions,
        super::api::satellites::in_range,
        super::api::satellites::propagate,
        super::api::satellites::trajectory,
        super::api::satellites::events,
        super::api::satellites::invalidate,
        super::api::satellites::update_tle,
        super::api::satellites::stats,
    ),
    components(
        schemas(
            BatchRequest,
            BatchResponse,
            PropagateRequest,
            InvalidateResponse,
            TleUpdateRequest,
            TleUpdateResponse,
            ErrorResponse,
            crate::position::ObserverLocation,
            crate::position::SatellitePosition,
            crate::position::Velocity,
            crate::events::SatelliteEvent,
            crate::events::EventType,
            crate::events::EventPayload,
            crate::service::ServiceStats,
            crate::service::MaintenanceStats,
            crate::service::CommandStats,
            crate::service::QueryStats,
            crate::cache::CacheStats,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Sat-O-Cache Position API",
        description = "Cached satellite positions, trajectories and event history",
        version = "0.1.0"
    ),
    tags(
        (name = "positions", description = "Current positions and range search"),
        (name = "trajectories", description = "Orbit propagation"),
        (name = "events", description = "Per-satellite event history"),
        (name = "cache", description = "Cache management and statistics")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/satellites/{id}/position",
            "/api/satellites/{id}/position/refresh",
            "/api/satellites/positions/batch",
            "/api/satellites/positions",
            "/api/satellites/in-range",
            "/api/satellites/{id}/trajectory",
            "/api/satellites/{id}/events",
            "/api/satellites/{id}/cache",
            "/api/satellites/tle",
            "/api/stats",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
