use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use domain::{TokenBundle, UserInfo};
use uuid::Uuid;

use super::ports::{invalid_credentials, refresh_invalid, token_invalid, IdentityClient};
use crate::errors::ServiceError;

struct Account {
    password: String,
    user: UserInfo,
}

/// An in-memory identity client for tests and local development. Tokens are
/// opaque strings of the form `access:<sub>` / `refresh:<sub>` — good enough
/// to exercise the auth flow without a real provider.
pub struct MockIdentityClient {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MockIdentityClient {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, username: &str, password: &str, display_name: &str, email: &str) -> Uuid {
        let sub = Uuid::new_v4();
        self.accounts.lock().unwrap().insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                user: UserInfo {
                    sub,
                    display_name: display_name.to_string(),
                    email: email.to_string(),
                },
            },
        );
        sub
    }
}

impl Default for MockIdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityClient for MockIdentityClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<TokenBundle, ServiceError> {
        let accounts = self.accounts.lock().unwrap();
        let account = accounts.get(username).ok_or_else(invalid_credentials)?;
        if account.password != password {
            return Err(invalid_credentials());
        }
        Ok(TokenBundle {
            access_token: format!("access:{}", account.user.sub),
            id_token: format!("id:{}", account.user.sub),
            refresh_token: format!("refresh:{}", account.user.sub),
            expires_in: 3600,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, ServiceError> {
        let sub = refresh_token
            .strip_prefix("refresh:")
            .ok_or_else(refresh_invalid)?;
        Ok(TokenBundle {
            access_token: format!("access:{sub}"),
            id_token: format!("id:{sub}"),
            refresh_token: refresh_token.to_string(),
            expires_in: 3600,
        })
    }

    async fn verify_access_token(&self, access_token: &str) -> Result<UserInfo, ServiceError> {
        let sub_str = access_token.strip_prefix("access:").ok_or_else(token_invalid)?;
        let sub = sub_str.parse::<Uuid>().map_err(|_| token_invalid())?;

        let accounts = self.accounts.lock().unwrap();
        accounts
            .values()
            .find(|a| a.user.sub == sub)
            .map(|a| a.user.clone())
            .ok_or_else(token_invalid)
    }
}
