use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::DataStore;

pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub config: AppConfig,
}
