//! In-memory `UserStore` for tests.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::repos::error::RepoResult;
use crate::repos::user_repo::{Role, RoleName, User, UserStore, UsernameMatch};

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    username_match: UsernameMatch,
    roles: HashMap<RoleName, Role>,
    users: Vec<User>,
}

impl MemoryUserStore {
    pub fn new(username_match: UsernameMatch) -> Self {
        Self {
            username_match,
            ..Default::default()
        }
    }

    pub fn with_role(mut self, id: i64, name: RoleName) -> Self {
        self.roles.insert(name, Role { id, name });
        self
    }

    /// Adds a user holding the given (already registered) roles.
    pub fn with_user(mut self, id: i64, username: &str, roles: &[RoleName]) -> Self {
        let roles = roles
            .iter()
            .filter_map(|name| self.roles.get(name).cloned())
            .collect();
        self.users.push(User {
            id,
            username: username.to_string(),
            password_hash: format!("hash-of-{username}"),
            roles,
        });
        self
    }

    fn matches(&self, stored: &str, candidate: &str) -> bool {
        match self.username_match {
            UsernameMatch::CaseSensitive => stored == candidate,
            UsernameMatch::CaseInsensitive => stored.to_lowercase() == candidate.to_lowercase(),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_role_by_name(&self, name: RoleName) -> RepoResult<Option<Role>> {
        Ok(self.roles.get(&name).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .filter(|u| self.matches(&u.username, username))
            .min_by_key(|u| u.id)
            .cloned())
    }

    async fn exists_by_username(&self, username: &str) -> RepoResult<bool> {
        Ok(self.users.iter().any(|u| self.matches(&u.username, username)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(policy: UsernameMatch) -> MemoryUserStore {
        MemoryUserStore::new(policy)
            .with_role(1, RoleName::User)
            .with_role(2, RoleName::Admin)
            .with_user(10, "alice", &[RoleName::User, RoleName::Admin])
            .with_user(11, "Bob", &[RoleName::User])
    }

    #[tokio::test]
    async fn find_role_by_name_is_exact() {
        let store = seeded(UsernameMatch::CaseSensitive);

        let admin = store.find_role_by_name(RoleName::Admin).await.unwrap();
        assert_eq!(
            admin,
            Some(Role {
                id: 2,
                name: RoleName::Admin
            })
        );

        // Absent is a value, not an error.
        let moderator = store.find_role_by_name(RoleName::Moderator).await.unwrap();
        assert_eq!(moderator, None);
    }

    #[tokio::test]
    async fn find_user_loads_roles() {
        let store = seeded(UsernameMatch::CaseSensitive);

        let alice = store.find_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(alice.id, 10);
        let names: Vec<_> = alice.roles.iter().map(|r| r.name).collect();
        assert_eq!(names, vec![RoleName::User, RoleName::Admin]);
    }

    #[tokio::test]
    async fn exists_agrees_with_find_under_every_policy() {
        let candidates = ["alice", "ALICE", "Bob", "bob", "nobody", ""];

        for policy in [UsernameMatch::CaseSensitive, UsernameMatch::CaseInsensitive] {
            let store = seeded(policy);
            for name in candidates {
                let found = store.find_user_by_username(name).await.unwrap().is_some();
                let exists = store.exists_by_username(name).await.unwrap();
                assert_eq!(found, exists, "policy {policy:?}, username {name:?}");
            }
        }
    }

    #[tokio::test]
    async fn case_policy_controls_matching() {
        let strict = seeded(UsernameMatch::CaseSensitive);
        assert!(!strict.exists_by_username("bob").await.unwrap());

        let relaxed = seeded(UsernameMatch::CaseInsensitive);
        let bob = relaxed.find_user_by_username("bob").await.unwrap().unwrap();
        assert_eq!(bob.username, "Bob");
    }
}
