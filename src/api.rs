//! HTTP API
//!
//! Webhook notifications, the inbound chat bridge and a health check.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::notify::NotificationSender;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub notifications: NotificationSender,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>, notifications: NotificationSender) -> Self {
        Self {
            manager,
            notifications,
        }
    }
}
