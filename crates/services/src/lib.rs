//! Application services for the translation session hub: session lifecycle,
//! admin identity, authentication/token handling, security limits, the audio
//! cache, and session broadcast fan-out. Each concern is a small struct with
//! its own tests; `crates/api` wires them together behind axum handlers.

pub mod admin_identity;
pub mod audio_cache;
pub mod broadcaster;
pub mod errors;
pub mod identity;
pub mod security;
pub mod session_manager;
pub mod token_store;
pub mod tts;

pub use admin_identity::AdminIdentityManager;
pub use audio_cache::AudioCache;
pub use broadcaster::{Broadcaster, OutboundMessage};
pub use errors::ServiceError;
pub use session_manager::SessionManager;
pub use token_store::TokenStore;
