use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::chat::{run_turn, TurnRecord};
use crate::db::executor;
use crate::web::state::AppState;

// Chat

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

/// Runs one conversational turn. Turn failures are part of the
/// conversation, so they come back as a tagged `error` reply rather than
/// an HTTP error; only an empty question is rejected outright.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }

    info!("Chat question: {}", question);

    match run_turn(&state, question).await {
        Ok(reply) => {
            let body = serde_json::to_value(&reply).map_err(|e| {
                error!("Failed to serialize reply: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize reply".to_string())
            })?;
            Ok(Json(body))
        }
        Err(e) => {
            error!("Turn failed: {}", e);
            Ok(Json(serde_json::json!({
                "kind": "error",
                "message": format!("Error: {}", e),
            })))
        }
    }
}

// Direct query execution

#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteQueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteQueryRequest>,
) -> Result<Json<ExecuteQueryResponse>, (StatusCode, String)> {
    let start_time = Instant::now();
    info!("Executing SQL query: {}", payload.query);

    let table = executor::run_query(state.db_path(), &payload.query)
        .await
        .map_err(|e| {
            error!("Failed to execute query: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;

    let row_count = table.rows.len();
    Ok(Json(ExecuteQueryResponse {
        columns: table.columns,
        rows: table.rows,
        row_count,
        execution_time_ms: start_time.elapsed().as_millis() as u64,
    }))
}

// Speech input

#[derive(Debug, Serialize)]
pub struct SpeechReply {
    pub text: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
}

impl SpeechReply {
    fn text(text: String) -> Self {
        Self { text: Some(text), warning: None, error: None }
    }

    fn warning(message: &str) -> Self {
        Self { text: None, warning: Some(message.to_string()), error: None }
    }

    fn error(message: String) -> Self {
        Self { text: None, warning: None, error: Some(message) }
    }
}

/// Accepts a microphone capture and answers with recognized text, a
/// warning, or a speech-specific error. Always 200: speech failures must
/// never abort the page or leak into a turn.
pub async fn speech_input(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Json<SpeechReply> {
    let Some(transcriber) = &state.transcriber else {
        return Json(SpeechReply::warning("Speech input is not configured."));
    };

    let mut audio: Option<(Vec<u8>, String)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("audio") {
                    continue;
                }
                let format = audio_format(field.content_type());
                match field.bytes().await {
                    Ok(bytes) => {
                        audio = Some((bytes.to_vec(), format));
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read audio field: {}", e);
                        return Json(SpeechReply::error(format!("Speech error: {}", e)));
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Malformed speech upload: {}", e);
                return Json(SpeechReply::error(format!("Speech error: {}", e)));
            }
        }
    }

    let Some((audio, format)) = audio else {
        return Json(SpeechReply::warning("No audio was uploaded."));
    };

    match transcriber.transcribe(&audio, &format).await {
        Ok(Some(text)) => Json(SpeechReply::text(text)),
        Ok(None) => {
            warn!("Speech recognized nothing");
            Json(SpeechReply::warning("Could not recognize speech, try again."))
        }
        Err(e) => {
            error!("Speech transcription failed: {}", e);
            Json(SpeechReply::error(format!("Speech error: {}", e)))
        }
    }
}

fn audio_format(content_type: Option<&str>) -> String {
    match content_type {
        Some(ct) if ct.contains("webm") => "webm".to_string(),
        Some(ct) if ct.contains("ogg") => "ogg".to_string(),
        Some(ct) if ct.contains("mpeg") || ct.contains("mp3") => "mp3".to_string(),
        _ => "wav".to_string(),
    }
}

// Schema

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<String>, (StatusCode, String)> {
    let description = state.schema_manager.describe().await.map_err(|e| {
        error!("Failed to describe schema: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })?;

    Ok(Json(description))
}

// History

pub async fn get_history(State(state): State<Arc<AppState>>) -> Json<Vec<TurnRecord>> {
    Json(state.recent_turns().await)
}

// System status

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub connected: bool,
    pub table_count: usize,
}

/// Reports reachability for display only: the probe opens a connection,
/// closes it, and never raises.
pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let connected = executor::probe(state.db_path()).await;

    let table_count = if connected {
        count_tables(state.db_path()).await
    } else {
        0
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        connected,
        table_count,
    })
}

async fn count_tables(db_path: &str) -> usize {
    let sql = "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'main'";
    match executor::run_query(db_path, sql).await {
        Ok(table) => table
            .scalar_text()
            .and_then(|text| text.parse::<usize>().ok())
            .unwrap_or(0),
        Err(e) => {
            error!("Failed to count tables: {}", e);
            0
        }
    }
}
