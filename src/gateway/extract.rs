//! Caller identity extraction.
//!
//! Real token validation is an external collaborator per spec.md §1 ("Out
//! of scope: ... authentication token validation"); this extractor only
//! models the interface the engines consume — an already-validated caller
//! id, or none for an anonymous/unauthenticated request. A production
//! deployment swaps this for whatever verifies the upstream session token
//! and injects the resulting user id the same way.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;

use crate::domain::UserId;

/// The caller's user id, if the request carried one. Always present as an
/// extractor argument even on anonymous routes — `None` is a first-class
/// outcome, not an error (spec.md's push/settlement reads are open to
/// anonymous share-code holders).
pub struct Caller(pub Option<UserId>);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
            return Ok(Caller(None));
        };
        let value = header.to_str().map_err(|_| (StatusCode::BAD_REQUEST, "invalid Authorization header"))?;
        let Some(token) = value.strip_prefix("Bearer ") else {
            return Ok(Caller(None));
        };
        match uuid::Uuid::parse_str(token.trim()) {
            Ok(id) => Ok(Caller(Some(UserId::from(id)))),
            Err(_) => Ok(Caller(None)),
        }
    }
}
