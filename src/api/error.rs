//! HTTP error pipeline.
//!
//! Components raise typed errors ([`crate::errors::Error`],
//! [`crate::auth::models::AuthError`]); this module converts them into the
//! one canonical JSON envelope:
//!
//! `{"success": false, "error": {"code", "message", "details"?}, "timestamp", "path"}`
//!
//! [`ApiError::into_response`] only records the error in the response
//! extensions; the [`error_envelope`] middleware is the single terminal stage
//! that serializes the body, logs the failure once, and preserves the
//! `Retry-After` header on rate-limit rejections.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::api::ApiState;
use crate::auth::models::AuthError;
use crate::errors::Error;

const STRAY_BODY_LIMIT: usize = 64 * 1024;

/// Enumerated wire error codes. The code is an explicit tag carried by the
/// error value, decoupled from any internal type naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    RateLimit,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::Validation,
            StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
            StatusCode::FORBIDDEN => ErrorCode::Forbidden,
            StatusCode::NOT_FOUND => ErrorCode::NotFound,
            StatusCode::CONFLICT => ErrorCode::Conflict,
            StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimit,
            _ => ErrorCode::Internal,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "Validation failed",
            ErrorCode::Unauthorized => "Unauthorized access",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::Conflict => "Resource already exists",
            ErrorCode::RateLimit => "Too many requests",
            ErrorCode::Internal => "Something went wrong!",
        }
    }
}

/// An error ready for the wire: code, user-facing message, optional internal
/// detail (only exposed outside production), and retry timing for 429s.
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<Vec<String>>,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn rate_limit<S: Into<String>>(message: S, retry_after_secs: u64) -> Self {
        let mut err = Self::new(ErrorCode::RateLimit, message);
        err.retry_after_secs = Some(retry_after_secs);
        err
    }

    /// Internal error with the generic caller-facing message; `detail` is
    /// kept server-side (logged, and surfaced only in non-production).
    pub fn internal<S: Into<String>>(detail: S) -> Self {
        let mut err = Self::new(ErrorCode::Internal, ErrorCode::Internal.default_message());
        err.details = Some(vec![detail.into()]);
        err
    }

    fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self { code, message: message.into(), details: None, retry_after_secs: None }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response.extensions_mut().insert(self);
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::validation(msg),
            Error::Unauthorized(msg) => ApiError::unauthorized(msg),
            Error::Forbidden(msg) => ApiError::forbidden(msg),
            Error::NotFound(msg) => ApiError::not_found(msg),
            Error::Conflict(msg) => ApiError::conflict(msg),
            Error::RateLimit { retry_after_secs } => ApiError::rate_limit(
                "Rate limit exceeded. Please try again later.",
                retry_after_secs,
            ),
            Error::Database { context, source } => {
                ApiError::internal(format!("{}: {}", context, source))
            }
            Error::Config(msg) | Error::Transport(msg) | Error::Internal(msg) => {
                ApiError::internal(msg)
            }
            Error::Io(err) => ApiError::internal(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::UserGone
            | AuthError::PasswordChanged
            | AuthError::NotAuthenticated => ApiError::unauthorized(err.to_string()),
            AuthError::PermissionDenied | AuthError::TwoFactorRequired => {
                ApiError::forbidden(err.to_string())
            }
            AuthError::RateLimited { retry_after_secs } => {
                ApiError::rate_limit(err.to_string(), retry_after_secs)
            }
            AuthError::LookupTimeout => ApiError::internal("authentication lookup timed out"),
            AuthError::Persistence(inner) => inner.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorInfo,
    timestamp: String,
    path: String,
}

/// Terminal error-handling stage. Every error response is serialized here and
/// nowhere else, and every error is logged exactly once before responding.
pub async fn error_envelope(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;
    if !(response.status().is_client_error() || response.status().is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let api_error = match parts.extensions.remove::<ApiError>() {
        Some(err) => err,
        // Error response produced outside the taxonomy (extractor rejection,
        // method mismatch): wrap it so the envelope shape is universal.
        None => {
            let bytes =
                axum::body::to_bytes(body, STRAY_BODY_LIMIT).await.unwrap_or_default();
            let code = ErrorCode::from_status(parts.status);
            let message = String::from_utf8_lossy(&bytes).trim().to_string();
            let message =
                if message.is_empty() { code.default_message().to_string() } else { message };
            ApiError { code, message, details: None, retry_after_secs: None }
        }
    };

    // The response status always agrees with the wire code. A stray status
    // with no taxonomy row (a 405, say) is reported as the unrecognized-error
    // kind, status included.
    let status = api_error.status();

    if status.is_server_error() {
        error!(
            code = api_error.code.as_str(),
            message = %api_error.message,
            details = ?api_error.details,
            http.method = %method,
            http.path = %path,
            http.status = status.as_u16(),
            client_ip = %client_ip,
            "Request failed"
        );
    } else {
        warn!(
            code = api_error.code.as_str(),
            message = %api_error.message,
            http.method = %method,
            http.path = %path,
            http.status = status.as_u16(),
            client_ip = %client_ip,
            "Request rejected"
        );
    }

    let details = if state.expose_error_details { api_error.details } else { None };
    let body = ErrorBody {
        success: false,
        error: ErrorInfo { code: api_error.code.as_str(), message: api_error.message, details },
        timestamp: Utc::now().to_rfc3339(),
        path,
    };

    let mut response = (status, Json(body)).into_response();

    // Rebuilding the body dropped every header the inner layers attached
    // (CORS, Retry-After). Carry them over, letting the new content headers
    // win over the stale ones.
    let mut headers = parts.headers;
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    for (name, value) in response.headers().iter() {
        headers.insert(name.clone(), value.clone());
    }
    *response.headers_mut() = headers;
    response
}
