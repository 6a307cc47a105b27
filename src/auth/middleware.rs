use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::jwt::verify_token;
use crate::server::AppState;

/// The identity a verified token resolves to.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
}

/// Extractor that requires a valid bearer token.
pub struct RequireAuth(pub AuthUser);

/// Extractor that accepts requests with or without a token. A present but
/// broken token is treated the same as no token at all.
pub struct OptionalAuth(pub Option<AuthUser>);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid or expired token"),
        };

        let body = json!({ "success": false, "message": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"shiftdesk\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = extract_and_verify(parts, state)?;
        Ok(RequireAuth(user))
    }
}

impl FromRequestParts<Arc<AppState>> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(extract_and_verify(parts, state).ok()))
    }
}

fn extract_and_verify(parts: &Parts, state: &Arc<AppState>) -> Result<AuthUser, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuth)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidScheme)?;

    let claims = verify_token(&state.config.jwt_secret, token)
        .map_err(|_| AuthError::InvalidToken)?;

    Ok(AuthUser {
        id: claims.sub,
        username: claims.username,
    })
}
