//! Core data model and error taxonomy for the translation session hub.
//!
//! This crate has no I/O of its own: it defines the session/admin/client
//! entities, the stable wire error-code contract, and the small validation
//! rules that every layer above it (persistence, services, api) relies on.

pub mod auth;
pub mod errors;
pub mod model;

pub use auth::{AuthSession, TokenBundle, UserInfo};
pub use errors::{DomainError, ErrorCode, ErrorDetails, ErrorEnvelope};
pub use model::{
    AdminIdentity, AudioArtifact, AudioCapabilities, AudioConfig, AudioEncoding, AudioQuality,
    ClientMembership, Session, SessionConfig, SessionListFilter, SessionStatus, SessionSummary,
    TtsMode, VoiceType, CURRENT_SCHEMA_VERSION,
};
