use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// GET /audio/{filename} — serves a cached synthesized-audio artifact by its
/// fingerprinted filename (`<sha256>.<format>`, as produced by the audio cache).
pub async fn serve_audio(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    if filename.contains('/') || filename.contains("..") {
        return (StatusCode::BAD_REQUEST, "invalid filename").into_response();
    }

    let path = std::path::Path::new(&state.config.persistence.audio_dir).join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = match path.extension().and_then(|e| e.to_str()) {
                Some("mp3") => "audio/mpeg",
                Some("opus") => "audio/opus",
                Some("wav") => "audio/wav",
                _ => "application/octet-stream",
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "artifact not found").into_response(),
    }
}
