use crate::collaborators::CollaboratorFactory;
use crate::config::Config;
use crate::session::MeetingSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Sessions by id, kept after they end so results stay queryable
    pub sessions: Arc<RwLock<HashMap<String, MeetingSession>>>,

    /// Collaborators for new sessions
    pub collaborators: Arc<dyn CollaboratorFactory>,

    /// Service defaults applied to every new session
    pub defaults: Arc<Config>,
}

impl AppState {
    pub fn new(collaborators: Arc<dyn CollaboratorFactory>, defaults: Config) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            collaborators,
            defaults: Arc::new(defaults),
        }
    }

    pub async fn session(&self, id: &str) -> Option<MeetingSession> {
        self.sessions.read().await.get(id).cloned()
    }
}
