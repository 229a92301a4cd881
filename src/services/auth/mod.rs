pub mod credentials;
pub mod error;
pub mod principal;
pub mod token;

pub use credentials::CredentialLoader;
pub use error::{AuthError, TokenConfigError, TokenError, TokenErrorKind};
pub use principal::Principal;
pub use token::TokenService;
