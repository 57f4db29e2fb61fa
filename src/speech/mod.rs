use base64::Engine;
use serde_json::json;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SpeechConfig;

/// Anything under this is silence or a truncated capture; skip the
/// network round trip entirely.
const MIN_AUDIO_BYTES: usize = 1024;

/// Uploads beyond this are refused locally.
const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug)]
pub enum SpeechError {
    ConfigError(String),
    ConnectionError(String),
    ResponseError(String),
    AudioError(String),
}

impl fmt::Display for SpeechError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechError::ConfigError(msg) => write!(f, "Speech configuration error: {}", msg),
            SpeechError::ConnectionError(msg) => write!(f, "Speech connection error: {}", msg),
            SpeechError::ResponseError(msg) => write!(f, "Speech response error: {}", msg),
            SpeechError::AudioError(msg) => write!(f, "Speech audio error: {}", msg),
        }
    }
}

impl Error for SpeechError {}

/// Best-effort speech-to-text over a multimodal chat-completions API.
/// Failures stay inside this adapter; the turn dispatcher never sees them.
#[derive(Debug)]
pub struct Transcriber {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    language: String,
}

impl Transcriber {
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            SpeechError::ConfigError("API key is required for speech input".to_string())
        })?;

        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "https://openrouter.ai/api/v1/chat/completions".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SpeechError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }

    /// Transcribes one audio capture. `Ok(None)` means "nothing was
    /// recognized" - a warning for the user, not an error.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        format: &str,
    ) -> Result<Option<String>, SpeechError> {
        if audio.len() < MIN_AUDIO_BYTES {
            debug!("Capture too small ({} bytes), treating as silence", audio.len());
            return Ok(None);
        }
        if audio.len() > MAX_AUDIO_BYTES {
            return Err(SpeechError::AudioError(format!(
                "Capture too large: {} bytes (max {})",
                audio.len(),
                MAX_AUDIO_BYTES
            )));
        }

        let audio_base64 = base64::engine::general_purpose::STANDARD.encode(audio);
        info!(
            "Sending {}KB of {} audio for transcription with model {}",
            audio.len() / 1024,
            format,
            self.model
        );

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "text",
                            "text": format!(
                                "Transcribe the audio exactly, in language `{}`. \
                                 If the recording is empty, silent or unintelligible, \
                                 return an empty string.",
                                self.language
                            )
                        },
                        {
                            "type": "input_audio",
                            "input_audio": {
                                "data": audio_base64,
                                "format": format
                            }
                        }
                    ]
                }
            ],
            "temperature": 0.0
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(SpeechError::ResponseError(format!(
                "HTTP {}: {}",
                status, preview
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SpeechError::ResponseError(e.to_string()))?;

        let text = data["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        if text.is_empty() {
            info!("Transcription came back empty");
            Ok(None)
        } else {
            info!("Transcribed: \"{}\"", text.chars().take(120).collect::<String>());
            Ok(Some(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transcriber_for(server: &MockServer) -> Transcriber {
        Transcriber::new(&SpeechConfig {
            api_url: Some(format!("{}/v1/chat/completions", server.uri())),
            api_key: Some("test-key".to_string()),
            model: "test-model".to_string(),
            language: "en".to_string(),
        })
        .unwrap()
    }

    fn fake_audio() -> Vec<u8> {
        vec![0u8; 4096]
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let err = Transcriber::new(&SpeechConfig::default()).unwrap_err();
        assert!(matches!(err, SpeechError::ConfigError(_)));
    }

    #[tokio::test]
    async fn tiny_capture_is_silence_without_network() {
        // No mock server mounted: a network call would fail the test.
        let server = MockServer::start().await;
        let result = transcriber_for(&server)
            .transcribe(&[0u8; 10], "wav")
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn oversized_capture_is_an_audio_error() {
        let server = MockServer::start().await;
        let err = transcriber_for(&server)
            .transcribe(&vec![0u8; MAX_AUDIO_BYTES + 1], "wav")
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::AudioError(_)));
    }

    #[tokio::test]
    async fn returns_recognized_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "  how many users are there?  "}}]
            })))
            .mount(&server)
            .await;

        let result = transcriber_for(&server)
            .transcribe(&fake_audio(), "wav")
            .await
            .unwrap();
        assert_eq!(result.as_deref(), Some("how many users are there?"));
    }

    #[tokio::test]
    async fn empty_transcript_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let result = transcriber_for(&server)
            .transcribe(&fake_audio(), "webm")
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn http_failure_is_a_response_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = transcriber_for(&server)
            .transcribe(&fake_audio(), "wav")
            .await
            .unwrap_err();
        match err {
            SpeechError::ResponseError(msg) => assert!(msg.contains("429")),
            other => panic!("expected ResponseError, got {:?}", other),
        }
    }
}
