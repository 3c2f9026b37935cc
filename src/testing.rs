//! In-memory stand-ins for the database-backed stores.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserStore,
        repo_types::{NewUser, User, UserStoreError},
    },
    db::DbHealth,
    records::{
        repo::RecordStore,
        repo_types::{Action, Analysis, NewAction, NewAnalysis},
    },
};

pub fn user(username: &str, email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        username: username.into(),
        email: email.into(),
        password_hash: "$argon2id$not-a-real-hash".into(),
        created_at: OffsetDateTime::now_utc(),
        last_login: None,
        preferences: serde_json::json!({}),
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<Vec<User>>,
}

impl MemoryUsers {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    pub fn remove(&self, id: Uuid) {
        self.rows.lock().unwrap().retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn create(&self, new: NewUser) -> Result<User, UserStoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == new.email) {
            return Err(UserStoreError::DuplicateEmail);
        }
        if rows.iter().any(|u| u.username == new.username) {
            return Err(UserStoreError::DuplicateUsername);
        }
        let mut created = user(&new.username, &new.email);
        created.password_hash = new.password_hash;
        rows.push(created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.rows.lock().unwrap().iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.get(id))
    }

    async fn update_last_login(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(u) = self.rows.lock().unwrap().iter_mut().find(|u| u.id == id) {
            u.last_login = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}

/// Records kept in insertion order; listing walks them backwards.
#[derive(Default)]
pub struct MemoryRecords {
    actions: Mutex<Vec<Action>>,
    analyses: Mutex<Vec<Analysis>>,
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn insert_action(&self, new: NewAction) -> anyhow::Result<Action> {
        let row = Action {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            action_type: new.action_type,
            description: new.description,
            metadata: new.metadata,
            timestamp: OffsetDateTime::now_utc(),
        };
        self.actions.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_actions(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Action>> {
        Ok(self
            .actions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_analysis(&self, new: NewAnalysis) -> anyhow::Result<Analysis> {
        let row = Analysis {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            analysis_type: new.analysis_type,
            results: new.results,
            metrics: new.metrics,
            timestamp: OffsetDateTime::now_utc(),
        };
        self.analyses.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_analyses(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Analysis>> {
        Ok(self
            .analyses
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

pub struct StubHealth {
    up: bool,
}

impl StubHealth {
    pub fn up() -> Self {
        Self { up: true }
    }

    pub fn down() -> Self {
        Self { up: false }
    }
}

#[async_trait]
impl DbHealth for StubHealth {
    async fn ping(&self) -> anyhow::Result<()> {
        if self.up {
            Ok(())
        } else {
            anyhow::bail!("connection refused")
        }
    }
}
