use std::fmt;

use thiserror::Error;

use crate::repos::RepoError;

/// Why a token failed verification.
///
/// Callers only see "unauthenticated"; the kind exists so operators can tell
/// tampering from expiry from garbage input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    SignatureInvalid,
    Malformed,
    Expired,
    Unsupported,
    ClaimsEmpty,
}

impl TokenErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "signature_invalid",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::Unsupported => "unsupported",
            Self::ClaimsEmpty => "claims_empty",
        }
    }
}

impl fmt::Display for TokenErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TokenError {
    pub kind: TokenErrorKind,
    pub message: String,
}

impl TokenError {
    pub fn new(kind: TokenErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

}

/// Rejected `TokenService` settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenConfigError {
    #[error("token secret must not be empty")]
    EmptySecret,

    #[error("token lifetime must be between 1 and {max}ms, got {got}ms")]
    LifetimeOutOfRange { got: i64, max: i64 },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found with username: {username}")]
    UserNotFound { username: String },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("token expiry is outside the representable time range")]
    ExpiryOutOfRange,

    #[error("user store failure")]
    Store(#[from] RepoError),
}
