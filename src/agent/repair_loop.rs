//! The bounded generate → execute → repair state machine.
//!
//! ```text
//! Generating ──► Executing ──► Success
//!     ▲              │
//!     │              ├──► Retrying ──► Generating   (retry_count < max_retries)
//!     │              └──► Exhausted                 (retry_count == max_retries)
//!     └── backend failure (streak < max_backend_failures) ──► BackendUnavailable
//! ```
//!
//! Query-quality failures (no code block, engine errors) consume the retry
//! budget and are fed back into history. Backend failures do neither; a
//! streak of them ends the run on its own terminal status.

use crate::agent::generator::{GenerationError, QueryGenerator};
use crate::agent::prompt::{build_prompt, PromptInput};
use crate::agent::state::{LoopStatus, QueryReport, QueryState, StepRecord};
use crate::config::AgentConfig;
use crate::db::executor::{QueryOutcome, QueryRunner};
use crate::db::schema::SchemaContext;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_retries: u32,
    pub history_window: usize,
    pub top_k: usize,
    pub max_backend_failures: u32,
    pub backend_retry_delay: Duration,
}

impl From<&AgentConfig> for LoopSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            history_window: config.history_window,
            top_k: config.top_k,
            max_backend_failures: config.max_backend_failures.max(1),
            backend_retry_delay: config.backend_retry_delay(),
        }
    }
}

enum Candidate {
    Query(String),
    /// The model answered without a usable block; carries the synthetic error
    Missing(String),
}

enum Phase {
    Generating,
    Executing(Candidate),
    Retrying(String),
}

pub struct RepairLoop {
    generator: QueryGenerator,
    settings: LoopSettings,
}

impl RepairLoop {
    pub fn new(generator: QueryGenerator, settings: LoopSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Drives one question to a terminal status. Never fails: every error
    /// inside the loop ends up in the returned trace.
    pub async fn run(
        &self,
        mut state: QueryState,
        schema: &SchemaContext,
        runner: &dyn QueryRunner,
        mut steps: Vec<StepRecord>,
    ) -> QueryReport {
        let settings = &self.settings;
        let mut attempt: u32 = 0;
        let mut backend_failures: u32 = 0;
        let mut phase = Phase::Generating;

        let status = loop {
            phase = match phase {
                Phase::Generating => {
                    let prompt = build_prompt(&PromptInput {
                        question: state.question(),
                        history: state.history(),
                        history_window: settings.history_window,
                        schema,
                        top_k: settings.top_k,
                    });

                    match self.generator.generate(&prompt).await {
                        Ok(sql) => {
                            backend_failures = 0;
                            attempt += 1;
                            info!("Attempt {}: generated candidate query", attempt);
                            debug!("Candidate query: {}", sql);
                            state.candidate_query = sql.clone();
                            steps.push(StepRecord::GenerateQuery {
                                attempt,
                                sql: Some(sql.clone()),
                                error: None,
                                backend_failure: false,
                            });
                            Phase::Executing(Candidate::Query(sql))
                        }
                        Err(e @ GenerationError::NoExtractableQuery(_)) => {
                            backend_failures = 0;
                            attempt += 1;
                            let message = e.to_string();
                            warn!("Attempt {}: {}", attempt, message);
                            state.candidate_query.clear();
                            steps.push(StepRecord::GenerateQuery {
                                attempt,
                                sql: None,
                                error: Some(message.clone()),
                                backend_failure: false,
                            });
                            Phase::Executing(Candidate::Missing(message))
                        }
                        Err(GenerationError::Backend(e)) => {
                            backend_failures += 1;
                            warn!(
                                "Generation backend failed ({} of {} tolerated): {}",
                                backend_failures, settings.max_backend_failures, e
                            );
                            steps.push(StepRecord::GenerateQuery {
                                attempt: attempt + 1,
                                sql: None,
                                error: Some(e.to_string()),
                                backend_failure: true,
                            });

                            if backend_failures >= settings.max_backend_failures {
                                state.result = Some(QueryOutcome::Error {
                                    error: format!(
                                        "Generation backend unavailable after {} consecutive failures: {}",
                                        backend_failures, e
                                    ),
                                });
                                break LoopStatus::BackendUnavailable;
                            }

                            if !settings.backend_retry_delay.is_zero() {
                                tokio::time::sleep(settings.backend_retry_delay).await;
                            }
                            Phase::Generating
                        }
                    }
                }

                Phase::Executing(candidate) => {
                    let (sql, outcome) = match candidate {
                        Candidate::Query(sql) => {
                            let outcome = QueryOutcome::from(runner.run(&sql).await);
                            (sql, outcome)
                        }
                        Candidate::Missing(message) => {
                            (String::new(), QueryOutcome::Error { error: message })
                        }
                    };

                    let failure = match &outcome {
                        QueryOutcome::Error { error } => Some(error.clone()),
                        QueryOutcome::Table(_) => None,
                    };
                    steps.push(StepRecord::ExecuteQuery {
                        attempt,
                        sql,
                        result: outcome.clone(),
                    });
                    state.result = Some(outcome);

                    match failure {
                        None => {
                            info!("Attempt {}: query executed successfully", attempt);
                            break LoopStatus::Success;
                        }
                        Some(error) if state.retry_count < settings.max_retries => {
                            warn!("Attempt {}: execution failed: {}", attempt, error);
                            Phase::Retrying(error)
                        }
                        Some(error) => {
                            warn!(
                                "Attempt {}: execution failed and retry budget ({}) is spent: {}",
                                attempt, settings.max_retries, error
                            );
                            break LoopStatus::Exhausted;
                        }
                    }
                }

                Phase::Retrying(error) => {
                    state.retry_count += 1;
                    let message = format!("Previous SQL error (attempt {}): {}", attempt, error);
                    state.push_history(message.clone());
                    steps.push(StepRecord::Retry {
                        retry_count: state.retry_count,
                        message,
                        history: state.history().to_vec(),
                    });
                    Phase::Generating
                }
            };
        };

        let question = state.question().to_string();
        let history = state.history().to_vec();
        QueryReport {
            status,
            question,
            sql: state.candidate_query,
            result: state.result.unwrap_or_else(|| QueryOutcome::Error {
                error: "run ended without a result".to_string(),
            }),
            retry_count: state.retry_count,
            history,
            steps,
        }
    }
}
