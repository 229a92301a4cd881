/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - credentials: CredentialLoader, tokens: TokenService
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::auth::{CredentialLoader, TokenService};

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialLoader>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(credentials: Arc<CredentialLoader>, tokens: Arc<TokenService>) -> Self {
        Self {
            credentials,
            tokens,
        }
    }
}
