use std::sync::Arc;

use tracing::debug;

use crate::repos::UserStore;
use crate::services::auth::{error::AuthError, principal::Principal};

/// Resolves a username into a `Principal` through the `UserStore`.
#[derive(Clone)]
pub struct CredentialLoader {
    store: Arc<dyn UserStore>,
}

impl CredentialLoader {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Load the principal for `username`.
    ///
    /// - `AuthError::UserNotFound` when no record matches.
    /// - `AuthError::Store` when the lookup itself failed.
    pub async fn load_by_username(&self, username: &str) -> Result<Principal, AuthError> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| {
                debug!(%username, "no user for username");
                AuthError::UserNotFound {
                    username: username.to_string(),
                }
            })?;

        Ok(Principal::from(user))
    }
}
