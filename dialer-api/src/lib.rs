//! HTTP surface for the outbound-call campaign scheduler.
//!
//! Exposes the cron trigger endpoint, campaign and contact CRUD, the credits
//! read/write surface, manual calls, and per-owner provider settings.

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{create_server, run_server, start_background_server};
pub use state::{ApiConfig, AppState};
