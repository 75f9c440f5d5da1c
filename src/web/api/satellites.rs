use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Permission;
use crate::events::SatelliteEvent;
use crate::position::{ObserverLocation, SatellitePosition};
use crate::service::ServiceStats;
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};

const DEFAULT_MAX_RESULTS: usize = 10;
const DEFAULT_EVENT_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ObserverQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
}

impl ObserverQuery {
    fn observer(&self) -> ApiResult<Option<ObserverLocation>> {
        observer_from_parts(self.lat, self.lon, self.alt)
    }
}

fn observer_from_parts(
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
) -> ApiResult<Option<ObserverLocation>> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(Some(ObserverLocation::new(lat, lon, alt)?)),
        (None, None) if alt.is_none() => Ok(None),
        _ => Err(ApiError::Validation(
            "observer needs both lat and lon".into(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub ids: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub radius_km: f64,
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TrajectoryQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub ids: Vec<u32>,
    #[serde(default)]
    pub observer: Option<ObserverLocation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub positions: Vec<Arc<SatellitePosition>>,
    pub success_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PropagateRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step_seconds: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TleUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TleUpdateResponse {
    pub satellite_id: u32,
    pub name: String,
    pub created: bool,
    pub removed_entries: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvalidateResponse {
    pub satellite_id: u32,
    pub removed_entries: usize,
}

#[utoipa::path(
    get,
    path = "/api/satellites/{id}/position",
    tag = "positions",
    params(
        ("id" = u32, Path, description = "NORAD catalog number"),
        ("lat" = Option<f64>, Query, description = "Observer latitude (degrees)"),
        ("lon" = Option<f64>, Query, description = "Observer longitude (degrees)"),
        ("alt" = Option<f64>, Query, description = "Observer altitude (meters)")
    ),
    responses(
        (status = 200, description = "Current position", body = SatellitePosition),
        (status = 400, description = "Invalid observer", body = ErrorResponse),
        (status = 404, description = "Unknown satellite", body = ErrorResponse),
        (status = 502, description = "Orbit computation failed", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn get_position(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<u32>,
    Query(query): Query<ObserverQuery>,
) -> ApiResult<Json<Arc<SatellitePosition>>> {
    require_permission(&user, Permission::ReadPositions)?;
    let observer = query.observer()?;
    let position = state
        .service
        .get_satellite_position(id, observer.as_ref())
        .await?;
    Ok(Json(position))
}

#[utoipa::path(
    post,
    path = "/api/satellites/{id}/position/refresh",
    tag = "positions",
    params(
        ("id" = u32, Path, description = "NORAD catalog number"),
        ("lat" = Option<f64>, Query, description = "Observer latitude (degrees)"),
        ("lon" = Option<f64>, Query, description = "Observer longitude (degrees)"),
        ("alt" = Option<f64>, Query, description = "Observer altitude (meters)")
    ),
    responses(
        (status = 200, description = "Freshly computed position", body = SatellitePosition),
        (status = 404, description = "Unknown satellite", body = ErrorResponse),
        (status = 502, description = "Orbit computation failed", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn refresh_position(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<u32>,
    Query(query): Query<ObserverQuery>,
) -> ApiResult<Json<Arc<SatellitePosition>>> {
    require_permission(&user, Permission::UpdatePositions)?;
    let observer = query.observer()?;
    let position = state
        .service
        .update_satellite_position(id, observer.as_ref(), true)
        .await?;
    Ok(Json(position))
}

#[utoipa::path(
    post,
    path = "/api/satellites/positions/batch",
    tag = "positions",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Positions that could be computed", body = BatchResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn batch_update(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    require_permission(&user, Permission::UpdatePositions)?;
    let observer = request
        .observer
        .map(|o| ObserverLocation::new(o.latitude_deg, o.longitude_deg, o.altitude_m))
        .transpose()?;

    let positions = state
        .service
        .batch_update_positions(&request.ids, observer.as_ref())
        .await?;

    Ok(Json(BatchResponse {
        success_count: positions.len(),
        total_count: request.ids.len(),
        positions,
    }))
}

#[utoipa::path(
    get,
    path = "/api/satellites/positions",
    tag = "positions",
    params(
        ("ids" = String, Query, description = "Comma-separated NORAD ids"),
        ("lat" = Option<f64>, Query, description = "Observer latitude (degrees)"),
        ("lon" = Option<f64>, Query, description = "Observer longitude (degrees)"),
        ("alt" = Option<f64>, Query, description = "Observer altitude (meters)")
    ),
    responses(
        (status = 200, description = "Cached positions; ids without fresh data are omitted", body = Vec<SatellitePosition>),
        (status = 400, description = "Invalid ids", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn list_positions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PositionsQuery>,
) -> ApiResult<Json<Vec<Arc<SatellitePosition>>>> {
    require_permission(&user, Permission::ReadPositions)?;
    let ids = parse_ids(&query.ids)?;
    let observer = observer_from_parts(query.lat, query.lon, query.alt)?;
    Ok(Json(
        state
            .service
            .get_multiple_satellite_positions(&ids, observer.as_ref()),
    ))
}

#[utoipa::path(
    get,
    path = "/api/satellites/in-range",
    tag = "positions",
    params(
        ("lat" = f64, Query, description = "Center latitude (degrees)"),
        ("lon" = f64, Query, description = "Center longitude (degrees)"),
        ("alt" = Option<f64>, Query, description = "Center altitude (meters)"),
        ("radius_km" = f64, Query, description = "Search radius (km, inclusive)"),
        ("max_results" = Option<usize>, Query, description = "Maximum results (default 10)")
    ),
    responses(
        (status = 200, description = "Nearest cached satellites, ascending by range", body = Vec<SatellitePosition>),
        (status = 400, description = "Invalid parameters", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn in_range(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<Arc<SatellitePosition>>>> {
    require_permission(&user, Permission::ReadPositions)?;
    let center = ObserverLocation::new(query.lat, query.lon, query.alt)?;
    let found = state.service.find_satellites_in_range(
        &center,
        query.radius_km,
        query.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
    )?;
    Ok(Json(found))
}

#[utoipa::path(
    post,
    path = "/api/satellites/{id}/trajectory",
    tag = "trajectories",
    params(("id" = u32, Path, description = "NORAD catalog number")),
    request_body = PropagateRequest,
    responses(
        (status = 200, description = "Propagated trajectory", body = Vec<SatellitePosition>),
        (status = 400, description = "Invalid range", body = ErrorResponse),
        (status = 404, description = "Unknown satellite", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn propagate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<u32>,
    Json(request): Json<PropagateRequest>,
) -> ApiResult<Json<Vec<Arc<SatellitePosition>>>> {
    require_permission(&user, Permission::UpdatePositions)?;
    let step = Duration::try_seconds(request.step_seconds).ok_or_else(|| {
        ApiError::Validation(format!("step_seconds {} is out of range", request.step_seconds))
    })?;
    let trajectory = state
        .service
        .calculate_orbit_propagation(id, request.start, request.end, step)
        .await?;
    Ok(Json(trajectory))
}

#[utoipa::path(
    get,
    path = "/api/satellites/{id}/trajectory",
    tag = "trajectories",
    params(
        ("id" = u32, Path, description = "NORAD catalog number"),
        ("start" = String, Query, description = "Start time (RFC3339)"),
        ("end" = String, Query, description = "End time (RFC3339)")
    ),
    responses(
        (status = 200, description = "Cached trajectory; empty if never propagated", body = Vec<SatellitePosition>)
    ),
    security(("api_key" = []))
)]
pub async fn trajectory(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<u32>,
    Query(query): Query<TrajectoryQuery>,
) -> ApiResult<Json<Vec<Arc<SatellitePosition>>>> {
    require_permission(&user, Permission::ReadPositions)?;
    Ok(Json(
        state
            .service
            .get_satellite_trajectory(id, query.start, query.end),
    ))
}

#[utoipa::path(
    get,
    path = "/api/satellites/{id}/events",
    tag = "events",
    params(
        ("id" = u32, Path, description = "NORAD catalog number"),
        ("since" = Option<String>, Query, description = "Only events at or after (RFC3339)"),
        ("limit" = Option<usize>, Query, description = "Maximum events (default 100)")
    ),
    responses(
        (status = 200, description = "Events, oldest first", body = Vec<SatelliteEvent>)
    ),
    security(("api_key" = []))
)]
pub async fn events(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<u32>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Vec<Arc<SatelliteEvent>>>> {
    require_permission(&user, Permission::ReadPositions)?;
    Ok(Json(state.service.get_satellite_events(
        id,
        query.since,
        query.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/satellites/{id}/cache",
    tag = "cache",
    params(("id" = u32, Path, description = "NORAD catalog number")),
    responses(
        (status = 200, description = "Cache entries removed", body = InvalidateResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn invalidate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<u32>,
) -> ApiResult<Json<InvalidateResponse>> {
    require_permission(&user, Permission::ManageCache)?;
    let removed_entries = state.service.invalidate_satellite_cache(id);
    Ok(Json(InvalidateResponse {
        satellite_id: id,
        removed_entries,
    }))
}

#[utoipa::path(
    put,
    path = "/api/satellites/tle",
    tag = "cache",
    request_body = TleUpdateRequest,
    responses(
        (status = 200, description = "Elements stored; cached positions invalidated", body = TleUpdateResponse),
        (status = 400, description = "Malformed TLE", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn update_tle(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<TleUpdateRequest>,
) -> ApiResult<Json<TleUpdateResponse>> {
    require_permission(&user, Permission::ManageCache)?;

    let (satellite_id, name, created) = {
        let mut catalog = state.catalog.write();
        let before = catalog.len();
        let satellite_id = catalog
            .insert_tle(request.name, &request.line1, &request.line2, "api")
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        let name = catalog
            .get(satellite_id)
            .map(|entry| entry.name.clone())
            .unwrap_or_default();
        (satellite_id, name, catalog.len() > before)
    };

    let removed_entries = state.service.apply_tle_update(satellite_id, &name, created);
    Ok(Json(TleUpdateResponse {
        satellite_id,
        name,
        created,
        removed_entries,
    }))
}

#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "cache",
    responses(
        (status = 200, description = "Service statistics", body = ServiceStats)
    ),
    security(("api_key" = []))
)]
pub async fn stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ServiceStats>> {
    require_permission(&user, Permission::ReadPositions)?;
    Ok(Json(state.service.get_service_stats()))
}

fn parse_ids(ids: &str) -> ApiResult<Vec<u32>> {
    let parsed = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| ApiError::Validation(format!("invalid satellite id '{s}'")))
        })
        .collect::<ApiResult<Vec<_>>>()?;
    if parsed.is_empty() {
        return Err(ApiError::Validation("no satellite ids given".into()));
    }
    Ok(parsed)
}
