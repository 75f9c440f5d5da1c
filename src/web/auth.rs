use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{Config, Permission};
use crate::orbit::TleCatalog;
use crate::service::SatellitePositionService;
use crate::web::api::error::ErrorResponse;

#[derive(Clone)]
pub struct AuthenticatedUser {
    pub name: String,
    pub permissions: HashSet<Permission>,
}

impl AuthenticatedUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<SatellitePositionService>,
    pub catalog: Arc<RwLock<TleCatalog>>,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidFormat,
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let reason = match self {
            AuthError::MissingAuth => "missing_authorization",
            AuthError::InvalidFormat => "invalid_authorization_format",
            AuthError::InvalidKey => "invalid_api_key",
        };
        (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(reason))).into_response()
    }
}

#[derive(Debug)]
pub struct PermissionError;

impl IntoResponse for PermissionError {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("insufficient_permissions")),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .ok_or(AuthError::MissingAuth)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        authenticate(&state.config, auth_header)
    }
}

fn authenticate(config: &Config, header: &str) -> Result<AuthenticatedUser, AuthError> {
    let key = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?;

    let api_key = config.find_api_key(key).ok_or(AuthError::InvalidKey)?;

    Ok(AuthenticatedUser {
        name: api_key.name.clone(),
        permissions: api_key.permissions.clone(),
    })
}

pub fn require_permission(
    user: &AuthenticatedUser,
    permission: Permission,
) -> Result<(), PermissionError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        log::debug!("user {} lacks {:?}", user.name, permission);
        Err(PermissionError)
    }
}
