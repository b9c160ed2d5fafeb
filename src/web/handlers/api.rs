use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::agent::service::{AgentError, AskRequest};
use crate::agent::state::QueryReport;
use crate::db::catalog::CatalogError;
use crate::db::executor::QueryOutcome;
use crate::db::run_store::ChatMessage;
use crate::db::schema::SchemaContext;
use crate::web::state::AppState;

type ApiError = (StatusCode, String);

#[derive(Debug, Deserialize)]
pub struct AskPayload {
    pub question: String,
    pub session_id: Option<String>,
    /// Explicit prior context; when absent the session's recent questions are used
    pub history: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub report: QueryReport,
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub project_count: usize,
    pub llm_backend: String,
}

fn catalog_error(e: CatalogError) -> ApiError {
    match e {
        CatalogError::InvalidName(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        CatalogError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        CatalogError::Io(_) => {
            error!("Project catalog error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read projects".to_string())
        }
    }
}

fn agent_error(e: AgentError) -> ApiError {
    match e {
        AgentError::SchemaUnavailable(_) => {
            warn!("{}", e);
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<AskResponse>, ApiError> {
    let question = payload.question.trim().to_string();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }

    let db_path = state.catalog.resolve(&project).map_err(catalog_error)?;
    let session_id = payload
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!("Question for project '{}' in session {}: {}", project, session_id, question);

    let seed_history = match payload.history {
        Some(history) => history,
        None => match state
            .store
            .recent_questions(&session_id, state.config.agent.history_window)
            .await
        {
            Ok(questions) => questions.into_iter().map(|q| format!("User: {}", q)).collect(),
            Err(e) => {
                warn!("Could not load history for session {}: {}", session_id, e);
                Vec::new()
            }
        },
    };

    if let Err(e) = state.store.append_user_turn(&session_id, &project, &question).await {
        error!("Failed to record question: {}", e);
    }

    let request = AskRequest {
        db_path,
        question,
        seed_history,
    };
    let timeout = state.agent.config().request_timeout();
    let report = match tokio::time::timeout(timeout, state.agent.ask(request)).await {
        Ok(result) => result.map_err(agent_error)?,
        Err(_) => {
            warn!("Question in session {} timed out after {:?}", session_id, timeout);
            return Err((
                StatusCode::GATEWAY_TIMEOUT,
                format!("Question timed out after {} seconds", timeout.as_secs()),
            ));
        }
    };

    if let Err(e) = state.store.append_report(&session_id, &project, &report).await {
        error!("Failed to record run: {}", e);
    }

    Ok(Json(AskResponse { session_id, report }))
}

pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<QueryOutcome>, ApiError> {
    if payload.sql.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "SQL must not be empty".to_string()));
    }
    let db_path = state.catalog.resolve(&project).map_err(catalog_error)?;
    info!("Executing SQL for project '{}': {}", project, payload.sql);

    let outcome = state
        .agent
        .run_sql(&db_path, &payload.sql)
        .await
        .map_err(agent_error)?;
    if outcome.is_error() {
        warn!("SQL for project '{}' failed in the engine", project);
    }
    Ok(Json(outcome))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    state.catalog.list().await.map(Json).map_err(catalog_error)
}

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<SchemaContext>, ApiError> {
    let db_path = state.catalog.resolve(&project).map_err(catalog_error)?;
    state.agent.describe(&db_path).await.map(Json).map_err(agent_error)
}

pub async fn session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    state.store.session_messages(&session_id).await.map(Json).map_err(|e| {
        error!("Failed to load session {}: {}", session_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load messages".to_string())
    })
}

pub async fn system_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemStatus>, ApiError> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();
    let project_count = state.catalog.list().await.map_err(catalog_error)?.len();

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        project_count,
        llm_backend: state.llm_manager.backend_name().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::db::db_pool::DuckDBConnectionManager;
    use crate::llm::{LlmError, LlmManager};
    use crate::test_support::{fixture_project, sql_block, ScriptedGenerator};
    use crate::web::routes::api_routes;
    use crate::web::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app(backend: Arc<ScriptedGenerator>) -> (TempDir, Router) {
        let data_dir = fixture_project("sales");
        let mut config = AppConfig::default();
        config.data_dir = data_dir.path().to_string_lossy().to_string();
        config.agent.backend_retry_delay_ms = 0;

        let pool = r2d2::Pool::builder()
            .max_size(2)
            .build(DuckDBConnectionManager::in_memory().unwrap())
            .unwrap();
        let state = AppState::new(config, pool, LlmManager::from_generator(backend));
        state.store.ensure_schema().await.unwrap();

        (data_dir, api_routes().with_state(Arc::new(state)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).to_string())
        });
        (status, value)
    }

    #[tokio::test]
    async fn ask_returns_trace_and_logs_the_turn() {
        let backend = ScriptedGenerator::new(vec![
            Ok(sql_block("SELECT * FROM table1 WHERE statuss = 'active'")),
            Ok(sql_block("SELECT id FROM table1 WHERE status = 'active' ORDER BY id")),
        ]);
        let (_dir, app) = app(backend).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/projects/sales/ask",
            Some(json!({"question": "active rows", "session_id": "s-1"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "s-1");
        assert_eq!(body["status"], "success");
        assert_eq!(body["retry_count"], 1);
        assert_eq!(body["result"]["columns"], json!(["id"]));
        assert_eq!(body["result"]["rows"][0], json!({"id": 2}));
        assert_eq!(body["steps"][0]["kind"], "load_schema");

        let (status, messages) = send(&app, "GET", "/api/sessions/s-1/messages", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages.as_array().unwrap().len(), 2);
        assert_eq!(messages[0]["content"], "active rows");
        assert_eq!(messages[1]["status"], "success");
    }

    #[tokio::test]
    async fn follow_up_questions_see_earlier_turns() {
        let backend = ScriptedGenerator::repeating(&sql_block("SELECT COUNT(*) AS n FROM table1"));
        let (_dir, app) = app(backend.clone()).await;

        for question in ["how many rows?", "and only active ones?"] {
            let (status, _) = send(
                &app,
                "POST",
                "/api/projects/sales/ask",
                Some(json!({"question": question, "session_id": "s-2"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let prompts = backend.prompts();
        assert!(!prompts[0].contains("User: how many rows?"));
        assert!(prompts[1].contains("User: how many rows?"));
    }

    #[tokio::test]
    async fn exhausted_and_backend_failures_are_still_answers() {
        let backend = ScriptedGenerator::new(vec![
            Err(LlmError::ConnectionError("refused".to_string())),
            Err(LlmError::ConnectionError("refused".to_string())),
        ]);
        let (_dir, app) = app(backend).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/projects/sales/ask",
            Some(json!({"question": "anything"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "backend_unavailable");
        assert!(body["result"]["error"].as_str().unwrap().contains("unavailable"));
        assert!(!body["session_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn request_errors_map_to_status_codes() {
        let (dir, app) = app(ScriptedGenerator::new(vec![])).await;

        let (status, _) = send(&app, "POST", "/api/projects/sales/ask", Some(json!({"question": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/api/projects/nope/ask", Some(json!({"question": "q"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        let (status, _) = send(&app, "POST", "/api/projects/empty/ask", Some(json!({"question": "q"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn direct_query_schema_and_listing() {
        let (_dir, app) = app(ScriptedGenerator::new(vec![])).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/projects/sales/query",
            Some(json!({"sql": "SELECT statuss FROM table1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].as_str().unwrap().contains("statuss"));

        let (_, body) = send(&app, "GET", "/api/projects/sales/schema", None).await;
        assert_eq!(body["tables"][0]["name"], "table1");

        let (_, body) = send(&app, "GET", "/api/projects", None).await;
        assert_eq!(body, json!(["sales"]));

        let (status, body) = send(&app, "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["project_count"], 1);
        assert_eq!(body["llm_backend"], "scripted");
    }
}
