use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::db::DbError;

/// A fully materialized query result: column names plus row-major cell
/// values. Built once per execution and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// (row count, column count)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True for exactly one row and one column - the scalar answer path.
    pub fn is_scalar(&self) -> bool {
        self.shape() == (1, 1)
    }

    /// The single cell of a (1,1) result rendered as prose. Strings come
    /// back unquoted; everything else uses its JSON rendering.
    pub fn scalar_text(&self) -> Option<String> {
        if !self.is_scalar() {
            return None;
        }
        Some(render_value(&self.rows[0][0]))
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[index])
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs a query on an open connection and materializes the result.
///
/// DuckDB hands results back as Arrow record batches; those go through the
/// Arrow JSON writer so every cell lands as a plain JSON value with the
/// engine's own formatting for dates, decimals and friends.
pub fn read_table(conn: &Connection, sql: &str) -> Result<ResultTable, DbError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DbError::QueryError(e.to_string()))?;

    let arrow_batch = stmt
        .query_arrow([])
        .map_err(|e| DbError::QueryError(e.to_string()))?;

    let schema = arrow_batch.get_schema();
    let record_batches: Vec<RecordBatch> = arrow_batch.collect();

    let columns = schema
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<String>>();

    let row_count: usize = record_batches.iter().map(|batch| batch.num_rows()).sum();

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(row_count);
    if row_count > 0 {
        let mut buffer = Vec::new();
        let mut writer = arrow::json::ArrayWriter::new(&mut buffer);
        let batch_refs: Vec<&RecordBatch> = record_batches.iter().collect();
        writer
            .write_batches(&batch_refs)
            .map_err(|e| DbError::DataError(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| DbError::DataError(e.to_string()))?;

        let objects: Vec<serde_json::Map<String, Value>> =
            serde_json::from_slice(&buffer).map_err(|e| DbError::DataError(e.to_string()))?;

        // The JSON writer omits null cells, so fill by column name.
        for object in objects {
            rows.push(
                columns
                    .iter()
                    .map(|column| object.get(column).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
        }
    }

    Ok(ResultTable { columns, rows })
}

/// Executes SQL against the database file, opening a connection scoped to
/// this one call. DuckDB work happens on the blocking pool.
pub async fn run_query(db_path: &str, sql: &str) -> Result<ResultTable, DbError> {
    info!("Executing SQL query: {}", sql);

    let db_path = db_path.to_string();
    let sql_to_execute = sql.to_string();

    let table = tokio::task::spawn_blocking(move || -> Result<ResultTable, DbError> {
        let conn = Connection::open(&db_path)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        read_table(&conn, &sql_to_execute)
    })
    .await
    .map_err(|e| DbError::TaskError(e.to_string()))??;

    debug!(
        "Query returned {} rows x {} columns",
        table.rows.len(),
        table.columns.len()
    );
    Ok(table)
}

/// Best-effort reachability check: open a connection, run SELECT 1, close.
/// Reports false on any failure and never raises to the caller.
pub async fn probe(db_path: &str) -> bool {
    let db_path = db_path.to_string();
    tokio::task::spawn_blocking(move || match Connection::open(&db_path) {
        Ok(conn) => conn
            .query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .is_ok(),
        Err(_) => false,
    })
    .await
    .unwrap_or(false)
}
