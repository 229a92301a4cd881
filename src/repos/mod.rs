/*
 * Responsibility
 * - persistence 層の公開インターフェース
 * - UserStore trait と Postgres 実装の re-export
 */
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod user_repo;

pub use error::{RepoError, RepoResult};
pub use user_repo::{PgUserStore, Role, RoleName, User, UserStore, UsernameMatch};
