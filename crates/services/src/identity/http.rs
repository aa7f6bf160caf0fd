use async_trait::async_trait;
use domain::{ErrorCode, TokenBundle, UserInfo};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ports::{invalid_credentials, provider_unavailable, refresh_invalid, token_invalid, IdentityClient};
use crate::errors::ServiceError;

/// Talks to a hosted identity provider's token and userinfo endpoints over
/// HTTP. Works against any OIDC-flavored provider that exposes password
/// grant, refresh grant and a userinfo endpoint (e.g. a Cognito user pool
/// fronted by a custom auth domain).
pub struct HttpIdentityClient {
    http_client: Client,
    token_url: String,
    userinfo_url: String,
    client_id: String,
}

impl HttpIdentityClient {
    pub fn new(issuer_url: &str, client_id: &str, request_timeout: std::time::Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client"),
            token_url: format!("{}/oauth2/token", issuer_url.trim_end_matches('/')),
            userinfo_url: format!("{}/oauth2/userInfo", issuer_url.trim_end_matches('/')),
            client_id: client_id.to_string(),
        }
    }
}

#[derive(Serialize)]
struct PasswordGrantRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrantRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    sub: uuid::Uuid,
    name: String,
    email: String,
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<TokenBundle, ServiceError> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(&PasswordGrantRequest {
                grant_type: "password",
                client_id: &self.client_id,
                username,
                password,
            })
            .send()
            .await
            .map_err(|_| provider_unavailable())?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(invalid_credentials());
        }
        if !response.status().is_success() {
            return Err(provider_unavailable());
        }

        let body: TokenResponse = response.json().await.map_err(|_| provider_unavailable())?;
        Ok(TokenBundle {
            access_token: body.access_token,
            id_token: body.id_token,
            refresh_token: body.refresh_token.unwrap_or_default(),
            expires_in: body.expires_in,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, ServiceError> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(&RefreshGrantRequest {
                grant_type: "refresh_token",
                client_id: &self.client_id,
                refresh_token,
            })
            .send()
            .await
            .map_err(|_| provider_unavailable())?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(refresh_invalid());
        }
        if !response.status().is_success() {
            return Err(provider_unavailable());
        }

        let body: TokenResponse = response.json().await.map_err(|_| provider_unavailable())?;
        Ok(TokenBundle {
            access_token: body.access_token,
            id_token: body.id_token,
            refresh_token: body.refresh_token.unwrap_or_else(|| refresh_token.to_string()),
            expires_in: body.expires_in,
        })
    }

    async fn verify_access_token(&self, access_token: &str) -> Result<UserInfo, ServiceError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|_| provider_unavailable())?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(token_invalid());
        }
        if !response.status().is_success() {
            return Err(ServiceError::new(
                ErrorCode::AuthProviderUnavailable,
                format!("userinfo endpoint returned {}", response.status()),
            ));
        }

        let body: UserInfoResponse = response.json().await.map_err(|_| token_invalid())?;
        Ok(UserInfo {
            sub: body.sub,
            display_name: body.name,
            email: body.email,
        })
    }
}
