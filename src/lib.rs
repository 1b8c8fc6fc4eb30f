//! SnapSplit — collaborative bill-splitting sync and settlement engine.
//!
//! # Modules
//!
//! - [`domain`] — the `Bill` aggregate, its entities, and the operation log entry shape
//! - [`error`] — the application-wide `AppError` taxonomy
//! - [`clock`] — a `Clock` trait seam for deterministic tests
//! - [`auth`] — per-request `isOwnerOrParticipant` authorization
//! - [`money`] — penny-exact proportional allocation
//! - [`merge`] — CRDT-style operation application to a `Bill` snapshot
//! - [`settlement`] — balance computation and debt-minimizing transfer suggestion
//! - [`repository`] — the `BillStore` persistence seam and its Postgres/in-memory implementations
//! - [`sync`] — bulk sync, delta sync, and the fine-grained operation log engines
//! - [`notify`] — post-commit push fan-out
//! - [`gateway`] — the HTTP/WebSocket surface
//! - [`config`] — environment-driven configuration
//! - [`logging`] — tracing subscriber setup

pub mod auth;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod merge;
pub mod money;
pub mod notify;
pub mod repository;
pub mod settlement;
pub mod sync;

pub use error::AppError;
