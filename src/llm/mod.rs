pub mod parse;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// Turns a natural-language question plus a schema description into the
/// model's raw reply text. Parsing that text into an answer template and a
/// SQL statement is the caller's job (see `parse`).
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, question: &str, schema: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    translator: Box<dyn Translator + Send + Sync>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let translator: Box<dyn Translator + Send + Sync> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { translator })
    }

    pub fn with_translator(translator: Box<dyn Translator + Send + Sync>) -> Self {
        Self { translator }
    }

    pub async fn translate(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        self.translator.translate(question, schema).await
    }
}
