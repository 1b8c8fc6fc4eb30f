//! Unified error envelope for the HTTP surface.
//!
//! Grounded on the teacher's `gateway/types/response.rs` `ApiError` /
//! `ApiResult` shape, but the wire code is a stable string
//! (`AppError::code()`) rather than the teacher's `i32` `error_codes`
//! table — spec.md §6 fixes the error envelope as `{ code, message }`
//! with string codes like `"BILL_NOT_FOUND"`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { code: self.code, message: self.message })).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = e.code();
        let message = e.to_string();
        Self { status, code, message }
    }
}

/// Handlers return `ApiResult<T>`; a bare `AppError` converts via `?`.
pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_conflict_maps_to_409_and_stable_code() {
        let api_err: ApiError = AppError::Conflict.into();
        assert_eq!(api_err.status, StatusCode::CONFLICT);
        assert_eq!(api_err.code, "CONFLICT");
    }

    #[test]
    fn app_error_bill_not_found_maps_to_404() {
        let api_err: ApiError = AppError::BillNotFound.into();
        assert_eq!(api_err.status, StatusCode::NOT_FOUND);
        assert_eq!(api_err.code, "BILL_NOT_FOUND");
    }
}
