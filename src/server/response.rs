use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::error::Error;

/// Wraps a payload object in the `{"success": true, ...}` envelope every
/// endpoint answers with.
pub fn ok(payload: Value) -> Json<Value> {
    envelope(payload)
}

/// Same envelope with a 201 status, for resource creation.
pub fn created(payload: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, envelope(payload))
}

fn envelope(payload: Value) -> Json<Value> {
    let mut body = json!({ "success": true });
    if let (Value::Object(body), Value::Object(payload)) = (&mut body, payload) {
        body.extend(payload);
    }
    Json(body)
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    #[must_use]
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "message": self.message });
        if let Some(details) = self.details {
            body["error"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => ApiError::bad_request(message),
            Error::Unauthorized(message) => ApiError::unauthorized(message),
            Error::Forbidden(message) => ApiError::forbidden(message),
            Error::NotFound(message) => ApiError::not_found(message),
            Error::Conflict(message) => ApiError::conflict(message),
            Error::Remote(remote) => {
                tracing::error!("record store request failed: {remote}");
                let status = if remote.is_transient() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                ApiError {
                    status,
                    message: "Record store unavailable".to_string(),
                    details: remote.details,
                }
            }
            Error::Config(message) => {
                tracing::error!("internal error: {message}");
                ApiError::internal("Internal server error")
            }
            Error::Serde(e) => {
                tracing::error!("serialization error: {e}");
                ApiError::internal("Internal server error")
            }
        }
    }
}
