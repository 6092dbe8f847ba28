use std::sync::Arc;

use harmonia_core::{ExportEngine, MessageStore};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: MessageStore,
    pub export: ExportEngine,
}
