use async_trait::async_trait;

use super::ports::{SpeechRequest, SpeechResponse, TtsService};
use crate::errors::ServiceError;

/// Synthesizes deterministic, content-addressable "audio" (really just the
/// UTF-8 bytes of the text) so tests can assert on cache behavior without a
/// real TTS provider in the loop.
pub struct MockTtsService;

#[async_trait]
impl TtsService for MockTtsService {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse, ServiceError> {
        Ok(SpeechResponse {
            audio_data: request.text.into_bytes(),
            content_type: format!("audio/{}", request.format),
        })
    }
}
