//! Stable error taxonomy shared by every layer of the hub.
//!
//! `ErrorCode` strings are contract: the WebSocket wire protocol and the
//! property tests in `services` key off these exact values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes. Exact strings are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication
    AuthInvalidCredentials,
    AuthTokenExpired,
    AuthTokenInvalid,
    AuthRefreshExpired,
    AuthRefreshInvalid,
    AuthSessionNotFound,
    AuthRateLimited,
    AuthProviderUnavailable,
    // Authorization
    AuthzAccessDenied,
    AuthzSessionNotOwned,
    AuthzInsufficientPermissions,
    AuthzOperationNotAllowed,
    // Session
    SessionNotFound,
    SessionAlreadyExists,
    SessionInvalidConfig,
    SessionCreateFailed,
    SessionUpdateFailed,
    SessionDeleteFailed,
    SessionClientLimitExceeded,
    // Admin identity
    AdminNotFound,
    AdminCreationFailed,
    AdminDisplayNameTaken,
    AdminRecordCorrupted,
    // System
    SystemInternalError,
    SystemPersistenceError,
    SystemNetworkError,
    SystemRateLimited,
    SystemMaintenance,
    SystemConnectionLimitExceeded,
    // Validation
    ValidationInvalidInput,
    ValidationMissingField,
    ValidationInvalidSessionId,
    ValidationInvalidLanguage,
    ValidationInvalidConfig,
}

impl ErrorCode {
    /// The exact contract string for this code (e.g. `"AUTHZ_SESSION_NOT_OWNED"`).
    pub const fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            AuthInvalidCredentials => "AUTH_1001",
            AuthTokenExpired => "AUTH_TOKEN_EXPIRED",
            AuthTokenInvalid => "AUTH_1003",
            AuthRefreshExpired => "AUTH_1004",
            AuthRefreshInvalid => "AUTH_1005",
            AuthSessionNotFound => "AUTH_1006",
            AuthRateLimited => "AUTH_1007",
            AuthProviderUnavailable => "AUTH_1008",
            AuthzAccessDenied => "AUTHZ_1101",
            AuthzSessionNotOwned => "AUTHZ_SESSION_NOT_OWNED",
            AuthzInsufficientPermissions => "AUTHZ_1103",
            AuthzOperationNotAllowed => "AUTHZ_1104",
            SessionNotFound => "SESSION_1201",
            SessionAlreadyExists => "SESSION_ALREADY_EXISTS",
            SessionInvalidConfig => "SESSION_1203",
            SessionCreateFailed => "SESSION_1204",
            SessionUpdateFailed => "SESSION_1205",
            SessionDeleteFailed => "SESSION_1206",
            SessionClientLimitExceeded => "SESSION_CLIENT_LIMIT_EXCEEDED",
            AdminNotFound => "ADMIN_1301",
            AdminCreationFailed => "ADMIN_1302",
            AdminDisplayNameTaken => "ADMIN_1303",
            AdminRecordCorrupted => "ADMIN_1304",
            SystemInternalError => "SYSTEM_INTERNAL_ERROR",
            SystemPersistenceError => "SYSTEM_1402",
            SystemNetworkError => "SYSTEM_1403",
            SystemRateLimited => "SYSTEM_1404",
            SystemMaintenance => "SYSTEM_1405",
            SystemConnectionLimitExceeded => "SYSTEM_CONNECTION_LIMIT_EXCEEDED",
            ValidationInvalidInput => "VALIDATION_1501",
            ValidationMissingField => "VALIDATION_1502",
            ValidationInvalidSessionId => "VALIDATION_1503",
            ValidationInvalidLanguage => "VALIDATION_1504",
            ValidationInvalidConfig => "VALIDATION_1505",
        }
    }

    /// Whether a client may retry this error at all.
    pub const fn retryable(self) -> bool {
        use ErrorCode::*;
        matches!(
            self,
            AuthRateLimited
                | AuthProviderUnavailable
                | SystemNetworkError
                | SystemRateLimited
                | SystemMaintenance
        )
    }

    /// A sensible default `retryAfter` in seconds for retryable codes.
    pub const fn default_retry_after(self) -> Option<u64> {
        use ErrorCode::*;
        match self {
            AuthRateLimited | SystemRateLimited => Some(60),
            AuthProviderUnavailable | SystemNetworkError => Some(5),
            SystemMaintenance => Some(300),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured details attached to an error envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<String>>,
}

/// The outbound error envelope sent to any socket on a failed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub envelope_type: String,
    pub error_code: &'static str,
    pub message: String,
    pub user_message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEnvelope {
    pub fn new(envelope_type: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            envelope_type: envelope_type.to_string(),
            error_code: code.as_str(),
            message: message.into(),
            user_message: default_user_message(code),
            retryable: code.retryable(),
            retry_after: code.default_retry_after(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

fn default_user_message(code: ErrorCode) -> String {
    use ErrorCode::*;
    match code {
        AuthInvalidCredentials => "Incorrect username or password.".to_string(),
        AuthTokenExpired => "Your session has expired, please sign in again.".to_string(),
        AuthTokenInvalid => "Your session is no longer valid, please sign in again.".to_string(),
        AuthRefreshExpired | AuthRefreshInvalid => "Please sign in again.".to_string(),
        AuthSessionNotFound => "No active session was found for this connection.".to_string(),
        AuthRateLimited => "Too many attempts, please wait and try again.".to_string(),
        AuthProviderUnavailable => {
            "The sign-in service is temporarily unavailable.".to_string()
        }
        AuthzAccessDenied | AuthzInsufficientPermissions => {
            "You don't have permission to do that.".to_string()
        }
        AuthzSessionNotOwned => "You don't own this session.".to_string(),
        AuthzOperationNotAllowed => "That action isn't allowed right now.".to_string(),
        SessionNotFound => "That session could not be found.".to_string(),
        SessionAlreadyExists => "A session with that id already exists.".to_string(),
        SessionInvalidConfig | ValidationInvalidConfig => {
            "That session configuration is invalid.".to_string()
        }
        SessionCreateFailed => "Could not create the session, please try again.".to_string(),
        SessionUpdateFailed => "Could not update the session, please try again.".to_string(),
        SessionDeleteFailed => "Could not end the session, please try again.".to_string(),
        SessionClientLimitExceeded => "This session is full.".to_string(),
        AdminNotFound => "Admin account not found.".to_string(),
        AdminCreationFailed => "Could not create your admin record.".to_string(),
        AdminDisplayNameTaken => "That display name is already in use.".to_string(),
        AdminRecordCorrupted => "Your admin record could not be read.".to_string(),
        SystemInternalError => "Something went wrong on our end.".to_string(),
        SystemPersistenceError => "We couldn't save that change, please try again.".to_string(),
        SystemNetworkError => "A network error occurred, please try again.".to_string(),
        SystemRateLimited => "Too many requests, please slow down.".to_string(),
        SystemMaintenance => "The service is under maintenance.".to_string(),
        SystemConnectionLimitExceeded => "Too many connections, please try again later.".to_string(),
        ValidationInvalidInput => "That request was invalid.".to_string(),
        ValidationMissingField => "A required field is missing.".to_string(),
        ValidationInvalidSessionId => "That session id is invalid.".to_string(),
        ValidationInvalidLanguage => "That language is not supported for this session.".to_string(),
    }
}

/// Errors raised while constructing or mutating domain entities.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("enabledLanguages must be a subset of targetLanguages")]
    EnabledLanguagesNotSubset,
    #[error("targetLanguages must not be empty")]
    EmptyTargetLanguages,
    #[error("unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
    #[error("preferred language {0} is not an enabled language for this session")]
    LanguageNotEnabled(String),
}

impl From<DomainError> for ErrorEnvelope {
    fn from(err: DomainError) -> Self {
        let code = match &err {
            DomainError::InvalidSessionId(_) => ErrorCode::ValidationInvalidSessionId,
            DomainError::LanguageNotEnabled(_) => ErrorCode::ValidationInvalidLanguage,
            _ => ErrorCode::ValidationInvalidConfig,
        };
        ErrorEnvelope::new("error", code, err.to_string())
    }
}
