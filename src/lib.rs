//! Library catalog server
//!
//! Authors and books linked many-to-many. The registries in [`services`] keep
//! the association consistent on every mutation; [`api`] exposes them as a REST
//! JSON API and [`repository`] provides the stores they persist through.

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
    pub store: repository::EntityStoreArc,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: &AppConfig, store: repository::EntityStoreArc) -> Self {
        let services = services::Services::new(store.clone(), &config.catalog);
        Self {
            store,
            services: Arc::new(services),
        }
    }
}
