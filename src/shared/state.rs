use crate::agent::AgentClient;
use crate::config::AppConfig;
use crate::shared::utils::DbPool;

/// Shared handles injected into every handler as `Arc<AppState>`. The pool
/// and webhook client are constructed once in `main`; handlers never reach
/// for globals.
pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
    pub agent: AgentClient,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("conn", &"DbPool")
            .field("agent", &self.agent)
            .finish()
    }
}
