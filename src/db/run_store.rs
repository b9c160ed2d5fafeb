use crate::agent::state::QueryReport;
use crate::db::db_pool::DuckDBConnectionManager;
use duckdb::Connection;
use r2d2::Pool;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Database error: {0}")]
    Db(#[from] duckdb::Error),
    #[error("Failed to serialize run: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Store worker failed: {0}")]
    Worker(String),
}

const SCHEMA: &str = "
    CREATE SEQUENCE IF NOT EXISTS chat_messages_seq;
    CREATE TABLE IF NOT EXISTS chat_messages (
        seq BIGINT PRIMARY KEY DEFAULT nextval('chat_messages_seq'),
        id VARCHAR NOT NULL,
        session_id VARCHAR NOT NULL,
        project VARCHAR NOT NULL,
        role VARCHAR NOT NULL,
        content VARCHAR NOT NULL,
        sql VARCHAR,
        status VARCHAR,
        steps_json VARCHAR,
        created_at VARCHAR NOT NULL
    );
";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub project: String,
    /// `user` or `assistant`
    pub role: String,
    /// The question for user turns, the serialized result for assistant turns
    pub content: String,
    pub sql: Option<String>,
    pub status: Option<String>,
    pub steps_json: Option<String>,
    pub created_at: String,
}

/// Conversation log kept in the application database.
#[derive(Clone)]
pub struct RunStore {
    pool: Pool<DuckDBConnectionManager>,
}

impl RunStore {
    pub fn new(pool: Pool<DuckDBConnectionManager>) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| Ok(conn.execute_batch(SCHEMA)?)).await
    }

    pub async fn append_user_turn(
        &self,
        session_id: &str,
        project: &str,
        question: &str,
    ) -> Result<String, StoreError> {
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            project: project.to_string(),
            role: "user".to_string(),
            content: question.to_string(),
            sql: None,
            status: None,
            steps_json: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.insert(message).await
    }

    pub async fn append_report(
        &self,
        session_id: &str,
        project: &str,
        report: &QueryReport,
    ) -> Result<String, StoreError> {
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            project: project.to_string(),
            role: "assistant".to_string(),
            content: serde_json::to_string(&report.result)?,
            sql: Some(report.sql.clone()),
            status: Some(report.status.as_str().to_string()),
            steps_json: Some(serde_json::to_string(&report.steps)?),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.insert(message).await
    }

    /// All messages of a session in insertion order.
    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, project, role, content, sql, status, steps_json, created_at
                 FROM chat_messages WHERE session_id = ? ORDER BY seq",
            )?;
            let messages = stmt
                .query_map(duckdb::params![session_id], |row| {
                    Ok(ChatMessage {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        project: row.get(2)?,
                        role: row.get(3)?,
                        content: row.get(4)?,
                        sql: row.get(5)?,
                        status: row.get(6)?,
                        steps_json: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    /// The last `limit` questions asked in a session, oldest first.
    pub async fn recent_questions(&self, session_id: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT content FROM chat_messages
                 WHERE session_id = ? AND role = 'user'
                 ORDER BY seq DESC LIMIT ?",
            )?;
            let mut questions = stmt
                .query_map(duckdb::params![session_id, limit as i64], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            questions.reverse();
            Ok(questions)
        })
        .await
    }

    async fn insert(&self, message: ChatMessage) -> Result<String, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO chat_messages
                 (id, session_id, project, role, content, sql, status, steps_json, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                duckdb::params![
                    message.id,
                    message.session_id,
                    message.project,
                    message.role,
                    message.content,
                    message.sql,
                    message.status,
                    message.steps_json,
                    message.created_at,
                ],
            )?;
            debug!("Stored {} message {} for session {}", message.role, message.id, message.session_id);
            Ok(message.id)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}
