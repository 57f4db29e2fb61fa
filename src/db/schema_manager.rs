use duckdb::Connection;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::db::executor::read_table;
use crate::db::DbError;

/// How long a cached schema description stays fresh.
const CACHE_TTL_SECONDS: i64 = 60;

/// How many sample rows to include per table in the LLM context.
const SAMPLE_ROWS: usize = 3;

/// Caches a markdown description of the database layout - tables, columns
/// and a few sample rows - used as context for SQL generation.
pub struct SchemaManager {
    db_path: String,
    cache: RwLock<String>,
    last_refresh: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
}

impl SchemaManager {
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            cache: RwLock::new(String::new()),
            last_refresh: RwLock::new(None),
        }
    }

    /// Returns the schema description, refreshing the cache when it is
    /// empty or stale.
    pub async fn describe(&self) -> Result<String, DbError> {
        let stale = {
            let last = self.last_refresh.read().await;
            match *last {
                Some(at) => chrono::Utc::now().signed_duration_since(at).num_seconds() > CACHE_TTL_SECONDS,
                None => true,
            }
        };

        if stale {
            self.refresh_cache().await?;
        }

        Ok(self.cache.read().await.clone())
    }

    /// Rebuilds the cached description from the live database.
    pub async fn refresh_cache(&self) -> Result<(), DbError> {
        info!("Refreshing schema cache");

        let db_path = self.db_path.clone();
        let description = tokio::task::spawn_blocking(move || describe_database(&db_path))
            .await
            .map_err(|e| DbError::TaskError(e.to_string()))??;

        let mut cache = self.cache.write().await;
        *cache = description;

        let mut timestamp = self.last_refresh.write().await;
        *timestamp = Some(chrono::Utc::now());

        debug!("Schema cache refreshed");
        Ok(())
    }
}

fn describe_database(db_path: &str) -> Result<String, DbError> {
    let conn =
        Connection::open(db_path).map_err(|e| DbError::ConnectionError(e.to_string()))?;

    let mut metadata = String::from("# DATABASE SCHEMA\n\n");

    let tables = list_tables(&conn)?;
    if tables.is_empty() {
        metadata.push_str("No tables found in this database.\n");
        return Ok(metadata);
    }

    for table_name in &tables {
        metadata.push_str(&format!("## Table: {}\n\n", table_name));

        let columns_sql = format!(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = '{}' \
             ORDER BY ordinal_position",
            table_name.replace('\'', "''")
        );

        match read_table(&conn, &columns_sql) {
            Ok(columns) if !columns.is_empty() => {
                metadata.push_str("| Column Name | Data Type | Nullable |\n");
                metadata.push_str("|------------|-----------|----------|\n");
                for row in &columns.rows {
                    metadata.push_str(&format!(
                        "| {} | {} | {} |\n",
                        cell_text(&row[0]),
                        cell_text(&row[1]),
                        cell_text(&row[2]),
                    ));
                }
                metadata.push('\n');
            }
            Ok(_) => {
                metadata.push_str("Table has no columns.\n\n");
                continue;
            }
            Err(e) => {
                error!("Could not read columns for table {}: {}", table_name, e);
                metadata.push_str("Could not retrieve column information.\n\n");
                continue;
            }
        }

        let sample_sql = format!(
            "SELECT * FROM \"{}\" LIMIT {}",
            table_name.replace('"', "\"\""),
            SAMPLE_ROWS
        );

        match read_table(&conn, &sample_sql) {
            Ok(sample) if !sample.is_empty() => {
                metadata.push_str("### Sample Data:\n\n");
                metadata.push_str("| ");
                for name in &sample.columns {
                    metadata.push_str(&format!("{} | ", name));
                }
                metadata.push_str("\n| ");
                for _ in 0..sample.columns.len() {
                    metadata.push_str("--- | ");
                }
                metadata.push('\n');
                for row in &sample.rows {
                    metadata.push_str("| ");
                    for value in row {
                        metadata.push_str(&format!("{} | ", cell_text(value)));
                    }
                    metadata.push('\n');
                }
                metadata.push('\n');
            }
            Ok(_) => {
                metadata.push('\n');
            }
            Err(e) => {
                error!("Could not read sample rows for table {}: {}", table_name, e);
                metadata.push_str("Could not retrieve sample data.\n\n");
            }
        }
    }

    Ok(metadata)
}

fn list_tables(conn: &Connection) -> Result<Vec<String>, DbError> {
    let query = "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'main' ORDER BY table_name";

    match read_table(conn, query) {
        Ok(table) => Ok(table
            .rows
            .iter()
            .filter_map(|row| row[0].as_str().map(|s| s.to_string()))
            .collect()),
        Err(e) => {
            error!("information_schema query failed: {}", e);

            // Fallback for databases where information_schema is unavailable
            let fallback = read_table(conn, "SHOW TABLES")?;
            Ok(fallback
                .rows
                .iter()
                .filter_map(|row| row[0].as_str().map(|s| s.to_string()))
                .collect())
        }
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db(name: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "nl-chat-schema-{}-{}.db",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER NOT NULL, item VARCHAR, amount DOUBLE);
             INSERT INTO orders VALUES (1, 'widget', 9.5), (2, 'gadget', 12.0);",
        )
        .unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn describe_lists_tables_columns_and_samples() {
        let manager = SchemaManager::new(seeded_db("describe"));
        let description = manager.describe().await.unwrap();

        assert!(description.contains("## Table: orders"));
        assert!(description.contains("| item |"));
        assert!(description.contains("Sample Data"));
        assert!(description.contains("widget"));
    }

    #[tokio::test]
    async fn describe_serves_from_cache_after_refresh() {
        let manager = SchemaManager::new(seeded_db("cache"));
        manager.refresh_cache().await.unwrap();

        let first = manager.describe().await.unwrap();
        let second = manager.describe().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_database_reports_no_tables() {
        let path = std::env::temp_dir().join(format!("nl-chat-schema-empty-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        Connection::open(&path).unwrap();
        let manager = SchemaManager::new(path.to_string_lossy().to_string());
        let description = manager.describe().await.unwrap();
        assert!(description.contains("No tables found"));
    }
}
