use async_trait::async_trait;
use domain::ErrorCode;
use reqwest::Client;
use serde::Serialize;

use super::ports::{SpeechRequest, SpeechResponse, TtsService};
use crate::errors::ServiceError;

/// Calls an external HTTP text-to-speech endpoint that accepts a JSON body
/// and returns raw audio bytes with a `Content-Type` header.
pub struct CloudTtsService {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl CloudTtsService {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            http_client: Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct SynthesizeRequestBody<'a> {
    text: &'a str,
    language: &'a str,
    #[serde(rename = "voiceType")]
    voice_type: &'a str,
    format: &'a str,
}

#[async_trait]
impl TtsService for CloudTtsService {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse, ServiceError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SynthesizeRequestBody {
                text: &request.text,
                language: &request.language,
                voice_type: request.voice_type.as_str(),
                format: &request.format,
            })
            .send()
            .await
            .map_err(|e| ServiceError::new(ErrorCode::SystemNetworkError, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::new(
                ErrorCode::SystemNetworkError,
                format!("tts provider returned {}", response.status()),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| ServiceError::new(ErrorCode::SystemNetworkError, e.to_string()))?
            .to_vec();

        Ok(SpeechResponse {
            audio_data,
            content_type,
        })
    }
}
