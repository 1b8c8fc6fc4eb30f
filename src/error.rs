//! Application error types.
//!
//! A single `AppError` enum carries every failure mode the sync, merge and
//! settlement engines can produce, with a stable string `code()` used in the
//! wire error envelope and an HTTP status suggestion for the gateway layer.

use thiserror::Error;

/// Application-wide error type.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("bill not found")]
    BillNotFound,

    #[error("member not found")]
    MemberNotFound,

    #[error("expense not found")]
    ExpenseNotFound,

    #[error("expense item not found")]
    ItemNotFound,

    #[error("invalid member reference: {0}")]
    InvalidMemberReference(String),

    #[error("version conflict")]
    Conflict,

    #[error("caller is neither owner nor participant")]
    Unauthorized,

    #[error("member is already claimed")]
    MemberAlreadyClaimed,

    #[error("caller has already claimed another member on this bill")]
    UserAlreadyClaimedOther,

    #[error("only the claimant may unclaim this member")]
    UnauthorizedUnclaim,

    #[error("member is not claimed")]
    MemberNotClaimed,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable string code used in the `{ code, message }` error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BillNotFound => "BILL_NOT_FOUND",
            AppError::MemberNotFound => "MEMBER_NOT_FOUND",
            AppError::ExpenseNotFound => "EXPENSE_NOT_FOUND",
            AppError::ItemNotFound => "ITEM_NOT_FOUND",
            AppError::InvalidMemberReference(_) => "INVALID_MEMBER_REFERENCE",
            AppError::Conflict => "CONFLICT",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::MemberAlreadyClaimed => "MEMBER_ALREADY_CLAIMED",
            AppError::UserAlreadyClaimedOther => "USER_ALREADY_CLAIMED_OTHER",
            AppError::UnauthorizedUnclaim => "UNAUTHORIZED_UNCLAIM",
            AppError::MemberNotClaimed => "MEMBER_NOT_CLAIMED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status suggestion for the gateway layer.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::BillNotFound
            | AppError::MemberNotFound
            | AppError::ExpenseNotFound
            | AppError::ItemNotFound => 404,
            AppError::InvalidMemberReference(_) | AppError::Validation(_) => 400,
            AppError::Conflict | AppError::MemberAlreadyClaimed | AppError::UserAlreadyClaimedOther => {
                409
            }
            AppError::Unauthorized | AppError::UnauthorizedUnclaim => 403,
            AppError::MemberNotClaimed => 409,
            AppError::Storage(_) | AppError::Internal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::BillNotFound.code(), "BILL_NOT_FOUND");
        assert_eq!(AppError::Conflict.code(), "CONFLICT");
        assert_eq!(
            AppError::InvalidMemberReference("m1".into()).code(),
            "INVALID_MEMBER_REFERENCE"
        );
    }

    #[test]
    fn http_status_matches_taxonomy() {
        assert_eq!(AppError::BillNotFound.http_status(), 404);
        assert_eq!(AppError::Conflict.http_status(), 409);
        assert_eq!(AppError::Unauthorized.http_status(), 403);
        assert_eq!(AppError::Storage("x".into()).http_status(), 500);
    }
}
