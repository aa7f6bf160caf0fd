use async_trait::async_trait;
use domain::{ErrorCode, TokenBundle, UserInfo};

use crate::errors::ServiceError;

/// Speaks to the external identity provider (e.g. a hosted user pool). All
/// three operations map provider-specific failures onto the hub's own
/// `AUTH_*` error codes so callers never see provider wire shapes.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<TokenBundle, ServiceError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, ServiceError>;

    /// Validates an access token and returns the identity it carries.
    async fn verify_access_token(&self, access_token: &str) -> Result<UserInfo, ServiceError>;
}

pub(crate) fn invalid_credentials() -> ServiceError {
    ServiceError::new(ErrorCode::AuthInvalidCredentials, "invalid username or password")
}

pub(crate) fn token_expired() -> ServiceError {
    ServiceError::new(ErrorCode::AuthTokenExpired, "access token has expired")
}

pub(crate) fn token_invalid() -> ServiceError {
    ServiceError::new(ErrorCode::AuthTokenInvalid, "access token failed verification")
}

pub(crate) fn refresh_expired() -> ServiceError {
    ServiceError::new(ErrorCode::AuthRefreshExpired, "refresh token has expired")
}

pub(crate) fn refresh_invalid() -> ServiceError {
    ServiceError::new(ErrorCode::AuthRefreshInvalid, "refresh token is invalid")
}

pub(crate) fn provider_unavailable() -> ServiceError {
    ServiceError::new(
        ErrorCode::AuthProviderUnavailable,
        "identity provider did not respond",
    )
}
