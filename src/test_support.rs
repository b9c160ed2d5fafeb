//! Scripted stand-ins for the model backend and the query engine.

use crate::db::executor::{ExecutionError, QueryRunner, TabularResult};
use crate::llm::{LlmError, TextGenerator};
use async_trait::async_trait;
use duckdb::Connection;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub fn sql_block(sql: &str) -> String {
    format!("Here is the query:\n```sql\n{}\n```", sql)
}

/// Replays canned responses in order and records every prompt it receives.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answers every prompt with the same text.
    pub fn repeating(text: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(text) => Ok(text.clone()),
            None => Err(LlmError::ResponseError("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Replays canned execution results and records the SQL it was handed.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<TabularResult, ExecutionError>>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<Result<TabularResult, ExecutionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryRunner for ScriptedRunner {
    async fn run(&self, sql: &str) -> Result<TabularResult, ExecutionError> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionError::new("runner script exhausted")))
    }
}

pub const FIXTURE_DDL: &str = "
    CREATE TABLE table1 (id INTEGER NOT NULL, status VARCHAR, created_at TIMESTAMP);
    INSERT INTO table1
        SELECT i, CASE WHEN i % 2 = 0 THEN 'active' ELSE 'closed' END,
               make_timestamp(2024, 1, i, 12, 0, 0)
        FROM range(1, 9) t(i);
";

/// Writes a DuckDB file at `path` with the fixture table.
pub fn write_fixture(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(FIXTURE_DDL).unwrap();
}

/// A temporary database holding `table1` with eight rows.
pub fn fixture_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fixture.duckdb");
    write_fixture(&path);
    (dir, path)
}

/// A data directory with one project, `<dir>/<name>/<name>.duckdb`.
pub fn fixture_project(name: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let project_dir = dir.path().join(name);
    std::fs::create_dir_all(&project_dir).unwrap();
    write_fixture(&project_dir.join(format!("{}.duckdb", name)));
    dir
}
