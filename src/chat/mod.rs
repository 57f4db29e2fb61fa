//! One request/response cycle: question in, exactly one reply out.

use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::chart::{build_chart, detect_chart_request, infer_chart_type, ChartRequest};
use crate::db::executor::{run_query, ResultTable};
use crate::db::DbError;
use crate::llm::parse::parse_reply;
use crate::llm::LlmError;
use crate::web::state::AppState;

const CHART_FALLBACK_NOTICE: &str = "Could not create chart. Showing data table instead.";

/// The single reply of a turn. Exactly one variant per turn; the variants
/// are the render paths and are mutually exclusive.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnReply {
    /// A (1,1) result rendered as prose: "{template} {value}".
    Scalar { answer: String, sql: String },
    /// The user asked for a chart. `chart` is absent when construction
    /// failed; `notice` explains the degrade.
    Chart {
        answer: String,
        sql: String,
        chart: Option<Value>,
        table: Option<ResultTable>,
        notice: Option<String>,
    },
    /// Template text plus the data, when no chart was requested.
    Table {
        answer: String,
        sql: String,
        table: Option<ResultTable>,
    },
}

#[derive(Debug)]
pub enum TurnError {
    /// No SQL statement could be extracted from the model's reply.
    Translation(String),
    /// The model call itself failed.
    Llm(LlmError),
    /// The generated SQL failed to execute.
    Execution(DbError),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::Translation(msg) => write!(f, "{}", msg),
            TurnError::Llm(e) => write!(f, "{}", e),
            TurnError::Execution(e) => write!(f, "{}", e),
        }
    }
}

impl Error for TurnError {}

/// A completed turn, kept for redisplay.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub question: String,
    pub sql: String,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Runs one turn, sequentially: chart intent, translation, parse,
/// execution, shape branch. Chart-construction failure degrades to a
/// table reply with a notice; everything else is a `TurnError`.
pub async fn run_turn(state: &AppState, question: &str) -> Result<TurnReply, TurnError> {
    debug!("Turn question: {}", question);

    let requested_chart = detect_chart_request(question);

    // A schema lookup failure is not fatal for the turn; the model just
    // gets less context.
    let schema = match state.schema_manager.describe().await {
        Ok(schema) => schema,
        Err(e) => {
            warn!("Failed to describe schema, continuing without it: {}", e);
            String::new()
        }
    };

    let raw_output = {
        let manager = state.llm_manager.lock().await;
        manager
            .translate(question, &schema)
            .await
            .map_err(TurnError::Llm)?
    };

    let parsed = parse_reply(raw_output.trim());
    let sql = match parsed.sql {
        Some(sql) => sql.replace('`', ""),
        None => {
            error!("No SQL found in model reply");
            return Err(TurnError::Translation(
                "Could not parse SQL query from response.".to_string(),
            ));
        }
    };

    info!("Generated SQL: {}", sql);

    let start_time = Instant::now();
    let table = run_query(state.db_path(), &sql)
        .await
        .map_err(TurnError::Execution)?;
    let execution_time_ms = start_time.elapsed().as_millis() as u64;

    state
        .record_turn(TurnRecord {
            question: question.to_string(),
            sql: sql.clone(),
            row_count: table.rows.len(),
            execution_time_ms,
            timestamp: chrono::Utc::now(),
        })
        .await;

    if let Some(value) = table.scalar_text() {
        return Ok(TurnReply::Scalar {
            answer: format!("{} {}", parsed.answer, value),
            sql,
        });
    }

    match requested_chart {
        ChartRequest::None => Ok(TurnReply::Table {
            answer: parsed.answer,
            sql,
            table: non_empty(table),
        }),
        ChartRequest::Auto | ChartRequest::Explicit(_) => {
            let kind = match requested_chart {
                ChartRequest::Explicit(kind) => Some(kind),
                _ => infer_chart_type(&table),
            };

            let chart = kind.and_then(|kind| build_chart(&table, kind, &parsed.answer));
            let notice = if chart.is_none() {
                info!("Chart degraded to table for kind {:?}", kind);
                Some(CHART_FALLBACK_NOTICE.to_string())
            } else {
                None
            };

            Ok(TurnReply::Chart {
                answer: parsed.answer,
                sql,
                chart,
                table: non_empty(table),
                notice,
            })
        }
    }
}

fn non_empty(table: ResultTable) -> Option<ResultTable> {
    if table.is_empty() {
        None
    } else {
        Some(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::{LlmManager, Translator};
    use async_trait::async_trait;
    use duckdb::Connection;

    struct CannedTranslator {
        reply: String,
    }

    #[async_trait]
    impl Translator for CannedTranslator {
        async fn translate(&self, _question: &str, _schema: &str) -> Result<String, LlmError> {
            Ok(self.reply.clone())
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _question: &str, _schema: &str) -> Result<String, LlmError> {
            Err(LlmError::ConnectionError("connection refused".to_string()))
        }
    }

    fn seeded_db(name: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "nl-chat-turn-{}-{}.db",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER, name VARCHAR, city VARCHAR, age INTEGER);
             INSERT INTO users VALUES
                 (1, 'ada', 'london', 36),
                 (2, 'grace', 'washington', 45),
                 (3, 'alan', 'london', 41);",
        )
        .unwrap();
        path.to_string_lossy().to_string()
    }

    fn state_with(db_name: &str, reply: &str) -> AppState {
        let mut config = AppConfig::default();
        config.database.connection_string = seeded_db(db_name);
        AppState::new(
            config,
            LlmManager::with_translator(Box::new(CannedTranslator {
                reply: reply.to_string(),
            })),
            None,
        )
    }

    #[tokio::test]
    async fn unparseable_reply_is_a_translation_error() {
        let state = state_with("parse-fail", "I do not know how to answer that.");
        let err = run_turn(&state, "how many users?").await.unwrap_err();
        match err {
            TurnError::Translation(msg) => assert!(msg.contains("Could not parse SQL")),
            other => panic!("expected Translation error, got {:?}", other),
        }
        // Nothing executed, so nothing was recorded.
        assert!(state.recent_turns().await.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_is_an_llm_error() {
        let mut config = AppConfig::default();
        config.database.connection_string = seeded_db("llm-fail");
        let state = AppState::new(
            config,
            LlmManager::with_translator(Box::new(FailingTranslator)),
            None,
        );
        let err = run_turn(&state, "how many users?").await.unwrap_err();
        assert!(matches!(err, TurnError::Llm(_)));
    }

    #[tokio::test]
    async fn scalar_result_renders_template_and_value() {
        let state = state_with(
            "scalar",
            "Answer: Total users:\n```sql\nSELECT COUNT(*) FROM users;\n```",
        );
        let reply = run_turn(&state, "how many users are there?").await.unwrap();
        match reply {
            TurnReply::Scalar { answer, sql } => {
                assert_eq!(answer, "Total users: 3");
                assert_eq!(sql, "SELECT COUNT(*) FROM users;");
            }
            other => panic!("expected scalar reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn table_result_without_chart_request() {
        let state = state_with(
            "table",
            "Answer: All users:\n```sql\nSELECT name, age FROM users ORDER BY name;\n```",
        );
        let reply = run_turn(&state, "list the users").await.unwrap();
        match reply {
            TurnReply::Table { answer, table, .. } => {
                assert_eq!(answer, "All users:");
                let table = table.expect("non-empty result must include the table");
                assert_eq!(table.shape(), (3, 2));
            }
            other => panic!("expected table reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_table_is_omitted_from_the_reply() {
        let state = state_with(
            "empty",
            "Answer: Matching users:\n```sql\nSELECT name, age FROM users WHERE age > 100;\n```",
        );
        let reply = run_turn(&state, "list ancient users").await.unwrap();
        match reply {
            TurnReply::Table { table, .. } => assert!(table.is_none()),
            other => panic!("expected table reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn chart_request_builds_chart_and_table() {
        let state = state_with(
            "chart",
            "Answer: Users per city:\n```sql\nSELECT city, COUNT(*) AS total FROM users GROUP BY city ORDER BY city;\n```",
        );
        let reply = run_turn(&state, "bar chart of users per city").await.unwrap();
        match reply {
            TurnReply::Chart { chart, table, notice, .. } => {
                let chart = chart.expect("bar chart should build for category/count data");
                assert_eq!(chart["encoding"]["y"]["field"], serde_json::json!("total"));
                assert!(table.is_some());
                assert!(notice.is_none());
            }
            other => panic!("expected chart reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn auto_chart_request_infers_kind_from_shape() {
        let state = state_with(
            "auto",
            "Answer: Users per city:\n```sql\nSELECT city, COUNT(*) AS total FROM users GROUP BY city;\n```",
        );
        let reply = run_turn(&state, "plot the users per city").await.unwrap();
        match reply {
            TurnReply::Chart { chart, .. } => assert!(chart.is_some()),
            other => panic!("expected chart reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_chart_degrades_to_table_with_notice() {
        // Two text columns: no numeric measure, so no chart can be built.
        let state = state_with(
            "degrade",
            "Answer: Names and cities:\n```sql\nSELECT name, city FROM users;\n```",
        );
        let reply = run_turn(&state, "pie chart of names and cities").await.unwrap();
        match reply {
            TurnReply::Chart { chart, table, notice, .. } => {
                assert!(chart.is_none());
                assert!(table.is_some());
                assert_eq!(notice.as_deref(), Some(CHART_FALLBACK_NOTICE));
            }
            other => panic!("expected degraded chart reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn scalar_wins_over_chart_request() {
        let state = state_with(
            "scalar-chart",
            "Answer: Total users:\n```sql\nSELECT COUNT(*) FROM users;\n```",
        );
        let reply = run_turn(&state, "chart how many users there are").await.unwrap();
        assert!(matches!(reply, TurnReply::Scalar { .. }));
    }

    #[tokio::test]
    async fn execution_failure_carries_the_engine_text() {
        let state = state_with(
            "exec-fail",
            "Answer: Oops:\n```sql\nSELECT missing_column FROM users;\n```",
        );
        let err = run_turn(&state, "break things").await.unwrap_err();
        match err {
            TurnError::Execution(e) => assert!(!e.to_string().is_empty()),
            other => panic!("expected Execution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn successful_turn_is_recorded_in_history() {
        let state = state_with(
            "history",
            "Answer: Total users:\n```sql\nSELECT COUNT(*) FROM users;\n```",
        );
        run_turn(&state, "how many users are there?").await.unwrap();
        let history = state.recent_turns().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].row_count, 1);
        assert_eq!(history[0].question, "how many users are there?");
    }

    #[tokio::test]
    async fn backticks_are_stripped_from_generated_sql() {
        let state = state_with(
            "backticks",
            "Answer: Total users:\n```sql\nSELECT COUNT(*) FROM `users`;\n```",
        );
        let reply = run_turn(&state, "how many users?").await.unwrap();
        match reply {
            TurnReply::Scalar { sql, .. } => assert_eq!(sql, "SELECT COUNT(*) FROM users;"),
            other => panic!("expected scalar reply, got {:?}", other),
        }
    }
}
