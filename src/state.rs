// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    services::session::SessionRegistry,
    store::{ObjectStore, QuizStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QuizStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Config,
}

impl AppState {
    /// Wires a session registry onto the given stores.
    pub fn new(store: Arc<dyn QuizStore>, objects: Arc<dyn ObjectStore>, config: Config) -> Self {
        let sessions = Arc::new(SessionRegistry::new(
            Arc::clone(&store),
            std::time::Duration::from_secs(config.autosave_interval_secs),
        ));
        Self {
            store,
            objects,
            sessions,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
