use crate::agent::generator::QueryGenerator;
use crate::agent::repair_loop::{LoopSettings, RepairLoop};
use crate::agent::state::{QueryReport, QueryState, StepRecord};
use crate::config::AgentConfig;
use crate::db::executor::QueryOutcome;
use crate::db::schema::SchemaContext;
use crate::db::session::{DbSession, SessionError};
use crate::llm::TextGenerator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The database could not be opened or its catalog could not be read.
    /// Nothing was generated.
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(#[source] SessionError),
}

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub db_path: PathBuf,
    pub question: String,
    /// Prior context, oldest first. Repair entries are appended after it.
    pub seed_history: Vec<String>,
}

/// Entry point for one question against one database.
#[derive(Clone)]
pub struct QueryAgent {
    generator: QueryGenerator,
    config: AgentConfig,
}

impl QueryAgent {
    pub fn new(backend: Arc<dyn TextGenerator>, config: AgentConfig) -> Self {
        Self {
            generator: QueryGenerator::new(backend),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn open(&self, db_path: &Path) -> Result<DbSession, AgentError> {
        DbSession::open(db_path, self.config.read_only).map_err(AgentError::SchemaUnavailable)
    }

    /// Answers `question` with a query, repairing it until it executes or
    /// the retry budget runs out. Schema problems fail fast; everything after
    /// that is reported through the returned status.
    pub async fn ask(&self, request: AskRequest) -> Result<QueryReport, AgentError> {
        let session = self.open(&request.db_path)?;
        let schema = session
            .introspect(self.config.sample_rows)
            .await
            .map_err(AgentError::SchemaUnavailable)?;
        info!(
            "Loaded schema for {} ({} tables)",
            session.path().display(),
            schema.tables.len()
        );

        let steps = vec![StepRecord::load_schema(&schema)];
        let state = QueryState::new(request.question, request.seed_history);
        let repair_loop = RepairLoop::new(self.generator.clone(), LoopSettings::from(&self.config));

        let report = repair_loop.run(state, &schema, &session, steps).await;
        info!(
            "Question finished after {} retries ({})",
            report.retry_count,
            report.summary()
        );
        Ok(report)
    }

    /// Runs caller-supplied SQL under the same session policy, no model involved.
    pub async fn run_sql(&self, db_path: &Path, sql: &str) -> Result<QueryOutcome, AgentError> {
        let session = self.open(db_path)?;
        Ok(QueryOutcome::from(session.execute(sql).await))
    }

    pub async fn describe(&self, db_path: &Path) -> Result<SchemaContext, AgentError> {
        let session = self.open(db_path)?;
        session
            .introspect(self.config.sample_rows)
            .await
            .map_err(AgentError::SchemaUnavailable)
    }
}
