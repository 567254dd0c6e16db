use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
    events::EventBus,
    lockout::AttemptStore,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: AppConfig,
    pub events: EventBus,
    pub login_attempts: Arc<dyn AttemptStore>,
}
