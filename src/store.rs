//! Member store interface
//!
//! The relational backend lives outside this process; handlers and tasks
//! only speak to it through the `MemberStore` trait. A dashmap-backed
//! in-memory implementation ships for tests and for running without a
//! configured backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Snapshot of a member's profile and role set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    /// Composite key, `user*guild`
    pub id: String,
    pub user_id: u64,
    pub user_name: String,
    pub display_name: String,
    pub guild_id: u64,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub avatar_url: String,
    pub roles: Vec<u64>,
    pub synced_at: DateTime<Utc>,
}

impl MemberSnapshot {
    #[must_use]
    pub fn key(user_id: u64, guild_id: u64) -> String {
        format!("{user_id}*{guild_id}")
    }
}

/// A staff- or user-requested deletion of specific logged messages,
/// executed by the weekly log cleanup task once `execute_at` has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredDeletion {
    pub id: String,
    pub channel_id: u64,
    pub message_ids: Vec<u64>,
    pub requested_by: u64,
    pub execute_at: DateTime<Utc>,
    pub executed: bool,
}

impl DeferredDeletion {
    #[must_use]
    pub fn new(
        channel_id: u64,
        message_ids: Vec<u64>,
        requested_by: u64,
        execute_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id,
            message_ids,
            requested_by,
            execute_at,
            executed: false,
        }
    }
}

/// External member store consumed by handlers and scheduled tasks
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Insert or update a member snapshot
    async fn upsert_member(&self, snapshot: MemberSnapshot) -> StoreResult<()>;

    /// Fetch a member snapshot if one exists
    async fn get_member(&self, user_id: u64, guild_id: u64)
    -> StoreResult<Option<MemberSnapshot>>;

    /// Read an operator-managed configuration constant
    async fn get_constant(&self, key: &str) -> StoreResult<Option<String>>;

    /// Record a deferred deletion request
    async fn schedule_deletion(&self, request: DeferredDeletion) -> StoreResult<()>;

    /// Unexecuted deletion requests due by the given instant
    async fn pending_deletions(&self, due_by: DateTime<Utc>)
    -> StoreResult<Vec<DeferredDeletion>>;

    /// Mark a deletion request as executed
    async fn mark_executed(&self, id: &str) -> StoreResult<()>;
}

/// In-memory member store
#[derive(Default)]
pub struct MemoryMemberStore {
    members: DashMap<String, MemberSnapshot>,
    constants: DashMap<String, String>,
    deletions: DashMap<String, DeferredDeletion>,
}

impl MemoryMemberStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a configuration constant
    pub fn set_constant(&self, key: impl Into<String>, value: impl Into<String>) {
        self.constants.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[async_trait]
impl MemberStore for MemoryMemberStore {
    async fn upsert_member(&self, snapshot: MemberSnapshot) -> StoreResult<()> {
        self.members.insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    async fn get_member(
        &self,
        user_id: u64,
        guild_id: u64,
    ) -> StoreResult<Option<MemberSnapshot>> {
        Ok(self
            .members
            .get(&MemberSnapshot::key(user_id, guild_id))
            .map(|entry| entry.value().clone()))
    }

    async fn get_constant(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.constants.get(key).map(|entry| entry.value().clone()))
    }

    async fn schedule_deletion(&self, request: DeferredDeletion) -> StoreResult<()> {
        self.deletions.insert(request.id.clone(), request);
        Ok(())
    }

    async fn pending_deletions(
        &self,
        due_by: DateTime<Utc>,
    ) -> StoreResult<Vec<DeferredDeletion>> {
        Ok(self
            .deletions
            .iter()
            .filter(|entry| !entry.value().executed && entry.value().execute_at <= due_by)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn mark_executed(&self, id: &str) -> StoreResult<()> {
        let Some(mut record) = self.deletions.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        record.executed = true;
        Ok(())
    }
}
