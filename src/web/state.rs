use crate::agent::service::QueryAgent;
use crate::config::AppConfig;
use crate::db::catalog::ProjectCatalog;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::run_store::RunStore;
use crate::llm::LlmManager;
use r2d2::Pool;
use std::path::PathBuf;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub catalog: ProjectCatalog,
    pub agent: QueryAgent,
    pub store: RunStore,
    pub llm_manager: LlmManager,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db_pool: Pool<DuckDBConnectionManager>,
        llm_manager: LlmManager,
    ) -> Self {
        let catalog = ProjectCatalog::new(PathBuf::from(&config.data_dir));
        let agent = QueryAgent::new(llm_manager.generator(), config.agent.clone());

        Self {
            config,
            catalog,
            agent,
            store: RunStore::new(db_pool),
            llm_manager,
            startup_time: chrono::Utc::now(),
        }
    }
}
