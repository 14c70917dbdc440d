//! Shelfdesk Library Reservation Desk
//!
//! Backend for a library admin dashboard: book catalog, reservation ledger
//! with a time-limited pending window, and staff accounts, served as a REST
//! JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
