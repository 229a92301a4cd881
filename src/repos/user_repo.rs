/*
 * Responsibility
 * - users / roles / user_roles テーブル向けの読み取り専用 lookup
 * - UserStore trait (credential loader はこれだけに依存する)
 * - PgPool を受け取る Postgres 実装 (手書き SQL)
 */
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::repos::error::{RepoError, RepoResult};

/// Role names known to the application. Stored as text in `roles.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleName {
    User,
    Moderator,
    Admin,
}

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "ROLE_USER",
            Self::Moderator => "ROLE_MODERATOR",
            Self::Admin => "ROLE_ADMIN",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = RepoError;

    // Only the stored form (`ROLE_ADMIN`) is recognised.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROLE_USER" => Ok(Self::User),
            "ROLE_MODERATOR" => Ok(Self::Moderator),
            "ROLE_ADMIN" => Ok(Self::Admin),
            _ => Err(RepoError::UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    pub name: RoleName,
}

#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the credential hash
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("roles", &self.roles)
            .finish()
    }
}

/// How usernames are compared by `find_user_by_username` and `exists_by_username`.
///
/// Both lookups always use the same policy so they cannot disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsernameMatch {
    #[default]
    CaseSensitive,
    /// Compares `lower(username)`. Expects a unique index on `lower(username)`;
    /// without one the lowest id wins.
    CaseInsensitive,
}

impl UsernameMatch {
    fn find_user_sql(self) -> &'static str {
        match self {
            Self::CaseSensitive => {
                r#"
                SELECT id, username, password
                FROM users
                WHERE username = $1
                "#
            }
            Self::CaseInsensitive => {
                r#"
                SELECT id, username, password
                FROM users
                WHERE lower(username) = lower($1)
                ORDER BY id
                LIMIT 1
                "#
            }
        }
    }

    fn exists_sql(self) -> &'static str {
        match self {
            Self::CaseSensitive => {
                r#"
                SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)
                "#
            }
            Self::CaseInsensitive => {
                r#"
                SELECT EXISTS (SELECT 1 FROM users WHERE lower(username) = lower($1))
                "#
            }
        }
    }
}

/// Read-only lookups over users and roles.
///
/// "Absent" is a normal outcome (`Ok(None)` / `Ok(false)`), never an error.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_role_by_name(&self, name: RoleName) -> RepoResult<Option<Role>>;

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;

    async fn exists_by_username(&self, username: &str) -> RepoResult<bool>;
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password: String,
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: i64,
    name: String,
}

impl TryFrom<RoleRow> for Role {
    type Error = RepoError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(Role {
            id: row.id,
            name: row.name.parse()?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
    username_match: UsernameMatch,
}

impl PgUserStore {
    pub fn new(pool: PgPool, username_match: UsernameMatch) -> Self {
        Self {
            pool,
            username_match,
        }
    }

    async fn roles_of(&self, user_id: i64) -> RepoResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT r.id, r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Role::try_from).collect()
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_role_by_name(&self, name: RoleName) -> RepoResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name
            FROM roles
            WHERE name = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Role::try_from).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(self.username_match.find_user_sql())
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let roles = self.roles_of(row.id).await?;

        Ok(Some(User {
            id: row.id,
            username: row.username,
            password_hash: row.password,
            roles,
        }))
    }

    async fn exists_by_username(&self, username: &str) -> RepoResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(self.username_match.exists_sql())
            .bind(username)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}
