use crate::db::executor::{QueryOutcome, Row, TabularResult};
use crate::db::schema::SchemaContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Working state for one question. Lives for a single request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryState {
    question: String,
    history: Vec<String>,
    pub candidate_query: String,
    pub result: Option<QueryOutcome>,
    pub retry_count: u32,
}

impl QueryState {
    pub fn new(question: impl Into<String>, seed_history: Vec<String>) -> Self {
        Self {
            question: question.into(),
            history: seed_history,
            candidate_query: String::new(),
            result: None,
            retry_count: 0,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Full history, oldest first. Never truncated; windowing happens when
    /// the prompt is built.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn push_history(&mut self, entry: String) {
        self.history.push(entry);
    }
}

/// Terminal status of a run. Only `Success` carries a usable table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Success,
    Exhausted,
    BackendUnavailable,
}

impl LoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::Success => "success",
            LoopStatus::Exhausted => "exhausted",
            LoopStatus::BackendUnavailable => "backend_unavailable",
        }
    }
}

/// One event of the reasoning trace, serialized as `{kind, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum StepRecord {
    LoadSchema {
        tables: Vec<String>,
        table_info: String,
        sample_data: BTreeMap<String, Vec<Row>>,
    },
    GenerateQuery {
        attempt: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// The backend itself failed; no model output was produced
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        backend_failure: bool,
    },
    ExecuteQuery {
        attempt: u32,
        sql: String,
        result: QueryOutcome,
    },
    Retry {
        retry_count: u32,
        message: String,
        history: Vec<String>,
    },
}

impl StepRecord {
    pub fn load_schema(schema: &SchemaContext) -> Self {
        StepRecord::LoadSchema {
            tables: schema.table_names(),
            table_info: schema.description(),
            sample_data: schema.samples.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StepRecord::LoadSchema { .. } => "load_schema",
            StepRecord::GenerateQuery { .. } => "generate_query",
            StepRecord::ExecuteQuery { .. } => "execute_query",
            StepRecord::Retry { .. } => "retry",
        }
    }
}

/// The final record handed to callers and written to the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryReport {
    pub status: LoopStatus,
    pub question: String,
    pub sql: String,
    pub result: QueryOutcome,
    pub retry_count: u32,
    pub history: Vec<String>,
    pub steps: Vec<StepRecord>,
}

impl QueryReport {
    pub fn table(&self) -> Option<&TabularResult> {
        match &self.result {
            QueryOutcome::Table(table) => Some(table),
            QueryOutcome::Error { .. } => None,
        }
    }

    /// Generation attempts that got an answer from the model.
    pub fn generation_attempts(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| {
                matches!(
                    step,
                    StepRecord::GenerateQuery {
                        backend_failure: false,
                        ..
                    }
                )
            })
            .count()
    }

    /// One-line summary for the service log.
    pub fn summary(&self) -> String {
        match &self.result {
            QueryOutcome::Table(table) => format!("{}: {} rows", self.status.as_str(), table.rows.len()),
            QueryOutcome::Error { error } => format!("{}: {}", self.status.as_str(), error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn steps_serialize_as_kind_and_payload() {
        let step = StepRecord::GenerateQuery {
            attempt: 1,
            sql: Some("SELECT 1".to_string()),
            error: None,
            backend_failure: false,
        };
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            json!({"kind": "generate_query", "payload": {"attempt": 1, "sql": "SELECT 1"}})
        );
        assert_eq!(step.kind(), "generate_query");

        let retry = StepRecord::Retry {
            retry_count: 1,
            message: "m".to_string(),
            history: vec!["m".to_string()],
        };
        assert_eq!(serde_json::to_value(&retry).unwrap()["kind"], "retry");
    }

    #[test]
    fn status_names_are_snake_case() {
        assert_eq!(
            serde_json::to_value(LoopStatus::BackendUnavailable).unwrap(),
            json!("backend_unavailable")
        );
        assert_eq!(LoopStatus::Exhausted.as_str(), "exhausted");
    }

    #[test]
    fn summary_names_status_and_outcome() {
        let mut report = QueryReport {
            status: LoopStatus::Exhausted,
            question: "q".to_string(),
            sql: "SELECT statuss FROM t".to_string(),
            result: QueryOutcome::Error {
                error: "column statuss not found".to_string(),
            },
            retry_count: 3,
            history: vec![],
            steps: vec![],
        };
        assert_eq!(report.summary(), "exhausted: column statuss not found");

        report.status = LoopStatus::Success;
        report.result = QueryOutcome::Table(TabularResult::default());
        assert_eq!(report.summary(), "success: 0 rows");
    }

    #[test]
    fn history_is_append_only() {
        let mut state = QueryState::new("q", vec!["User: earlier".to_string()]);
        state.push_history("Previous SQL error (attempt 1): boom".to_string());
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history()[0], "User: earlier");
        assert_eq!(state.question(), "q");
    }
}
