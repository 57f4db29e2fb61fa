pub mod executor;
pub mod schema_manager;

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum DbError {
    ConnectionError(String),
    QueryError(String),
    DataError(String),
    TaskError(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::ConnectionError(msg) => write!(f, "Database connection error: {}", msg),
            DbError::QueryError(msg) => write!(f, "SQL error: {}", msg),
            DbError::DataError(msg) => write!(f, "Result conversion error: {}", msg),
            DbError::TaskError(msg) => write!(f, "Database task error: {}", msg),
        }
    }
}

impl Error for DbError {}
