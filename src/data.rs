//! Data access.
//!
//! The runtime only needs one capability from storage: look a user up by a
//! key and learn whether it was found, absent, or the lookup itself broke.
//! [`Lookup`] makes those three outcomes explicit instead of comparing an
//! error value against a shared "not found" sentinel.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default per-call deadline for a store lookup.
pub const DEFAULT_LOOKUP_DEADLINE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_activated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a keyed lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// The store could not answer. The detail is for logs only.
    Failure(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Lookup<User>;
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// Process-local store keyed by email.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the user stored under `user.email`.
    pub fn insert(&self, user: User) {
        match self.users.write() {
            Ok(mut users) => {
                users.insert(user.email.clone(), user);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(user.email.clone(), user);
            }
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_email(&self, email: &str) -> Lookup<User> {
        let users = match self.users.read() {
            Ok(users) => users,
            Err(_) => return Lookup::Failure("user table lock poisoned".to_owned()),
        };
        match users.get(email) {
            Some(user) => Lookup::Found(user.clone()),
            None => Lookup::NotFound,
        }
    }
}

// ── Deadline ──────────────────────────────────────────────────────────────────

/// Bounds every lookup of the wrapped store. An elapsed deadline is reported
/// as [`Lookup::Failure`].
#[derive(Debug)]
pub struct WithDeadline<S> {
    inner: S,
    deadline: Duration,
}

impl<S> WithDeadline<S> {
    pub fn new(inner: S, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl<S: UserStore> UserStore for WithDeadline<S> {
    async fn get_by_email(&self, email: &str) -> Lookup<User> {
        match tokio::time::timeout(self.deadline, self.inner.get_by_email(email)).await {
            Ok(outcome) => outcome,
            Err(_) => Lookup::Failure(format!("user lookup exceeded {:?}", self.deadline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: "7f1c".into(),
            email: email.into(),
            is_activated: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn memory_store_finds_inserted_users() {
        let store = MemoryUserStore::new();
        store.insert(user("a@example.com"));

        assert!(matches!(store.get_by_email("a@example.com").await, Lookup::Found(u) if u.id == "7f1c"));
        assert_eq!(store.get_by_email("b@example.com").await, Lookup::NotFound);
    }

    struct Slow;

    #[async_trait]
    impl UserStore for Slow {
        async fn get_by_email(&self, _: &str) -> Lookup<User> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Lookup::NotFound
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_slow_lookups_into_failures() {
        let store = WithDeadline::new(Slow, DEFAULT_LOOKUP_DEADLINE);
        match store.get_by_email("a@example.com").await {
            Lookup::Failure(detail) => assert!(detail.contains("3s"), "{detail}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_passes_fast_lookups_through() {
        let inner = MemoryUserStore::new();
        inner.insert(user("a@example.com"));
        let store = WithDeadline::new(inner, DEFAULT_LOOKUP_DEADLINE);
        assert!(matches!(store.get_by_email("a@example.com").await, Lookup::Found(_)));
    }
}
