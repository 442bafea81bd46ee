use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{notify::Notifier, verification::SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Verification sessions, created at service start and injected here
    /// rather than living in a module-level singleton.
    pub sessions: Arc<SessionStore>,
    pub notifier: Notifier,
}
