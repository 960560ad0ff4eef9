//! EcoStream Monitor Library
//!
//! Core modules for the fleet monitoring companion: local auth over an
//! on-device credential store, and a live telemetry ingestion pipeline.

pub mod accounts;
pub mod auth;
pub mod hashing;
pub mod logging;
pub mod poller;
pub mod storage;
pub mod sync;
pub mod telemetry;

use std::sync::Arc;

use auth::{AuthService, SessionManager};
use storage::Storage;
use sync::ApiClient;

/// Application services shared by the runner
pub struct AppState {
    pub auth: AuthService,
    pub sessions: SessionManager,
    pub api: Arc<ApiClient>,
}

impl AppState {
    pub fn new(storage: Storage, api_base_url: &str) -> Self {
        Self {
            auth: AuthService::new(storage.clone()),
            sessions: SessionManager::new(storage),
            api: Arc::new(ApiClient::new(api_base_url)),
        }
    }
}
