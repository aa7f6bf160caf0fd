use async_trait::async_trait;
use domain::VoiceType;

use crate::errors::ServiceError;

/// Request for text-to-speech synthesis of a single translated utterance.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    /// Text to synthesize.
    pub text: String,
    /// BCP-47 language tag the text is in.
    pub language: String,
    /// Synthesis tier to request from the provider.
    pub voice_type: VoiceType,
    /// Desired output encoding, e.g. `"mp3"` or `"opus"`.
    pub format: String,
}

/// Synthesized audio and the content type clients should expect.
#[derive(Debug, Clone)]
pub struct SpeechResponse {
    pub audio_data: Vec<u8>,
    pub content_type: String,
}

/// Speaks to the external neural/standard TTS provider. `Disabled`/`Local`
/// session modes never call through this trait at all.
#[async_trait]
pub trait TtsService: Send + Sync {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse, ServiceError>;
}
