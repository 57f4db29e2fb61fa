use crate::chat::TurnRecord;
use crate::config::AppConfig;
use crate::db::schema_manager::SchemaManager;
use crate::llm::LlmManager;
use crate::speech::Transcriber;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::RwLock;

/// How many turn records to keep for redisplay.
const HISTORY_LIMIT: usize = 100;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: Arc<Mutex<LlmManager>>,
    pub transcriber: Option<Transcriber>,
    pub schema_manager: SchemaManager,
    pub history: RwLock<Vec<TurnRecord>>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        llm_manager: LlmManager,
        transcriber: Option<Transcriber>,
    ) -> Self {
        let schema_manager = SchemaManager::new(config.database.connection_string.clone());

        Self {
            config,
            llm_manager: Arc::new(Mutex::new(llm_manager)),
            transcriber,
            schema_manager,
            history: RwLock::new(Vec::new()),
            startup_time: chrono::Utc::now(),
        }
    }

    pub fn db_path(&self) -> &str {
        &self.config.database.connection_string
    }

    /// Records a completed turn, newest first, bounded by HISTORY_LIMIT.
    pub async fn record_turn(&self, record: TurnRecord) {
        let mut history = self.history.write().await;
        history.insert(0, record);
        history.truncate(HISTORY_LIMIT);
    }

    pub async fn recent_turns(&self) -> Vec<TurnRecord> {
        self.history.read().await.clone()
    }
}
