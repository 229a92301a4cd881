use std::fmt;

use crate::repos::User;

/// Authenticated-identity view of a `User`, built fresh per lookup.
///
/// Kept apart from the persistence entity: downstream authorization only sees
/// the username and the authority strings.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub authorities: Vec<String>,
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        let authorities = user
            .roles
            .iter()
            .map(|role| role.name.as_str().to_string())
            .collect();

        Self {
            id: user.id,
            username: user.username,
            password_hash: user.password_hash,
            authorities,
        }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the credential hash
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("authorities", &self.authorities)
            .finish()
    }
}
