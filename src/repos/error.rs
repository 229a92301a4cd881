/**
 * Responsibility
 * - repo が上位に伝える意味の定義
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[from] sqlx::Error),
    // A roles row whose name is outside the known set.
    #[error("unknown role name: {0}")]
    UnknownRole(String),
}

pub type RepoResult<T> = Result<T, RepoError>;
