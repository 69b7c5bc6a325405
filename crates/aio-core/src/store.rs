use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{BridgeError, DirectoryMember, DirectoryUnit, InboundMessageRecord};

/// Host-side persistence for mirrored directory records, keyed by remote id.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_unit(&self, remote_id: &str) -> Result<Option<DirectoryUnit>, BridgeError>;
    /// Insert or replace the unit with the same `remote_id`.
    async fn save_unit(&self, unit: DirectoryUnit) -> Result<(), BridgeError>;
    async fn find_member(&self, remote_id: &str) -> Result<Option<DirectoryMember>, BridgeError>;
    /// Insert or replace the member with the same `remote_id`.
    async fn save_member(&self, member: DirectoryMember) -> Result<(), BridgeError>;
    async fn count_units(&self) -> Result<usize, BridgeError>;
    async fn count_members(&self) -> Result<usize, BridgeError>;
}

/// Host-side persistence for inbound chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a record. Returns `false` if a record with the same
    /// `message_id` already exists; the existing record is left untouched.
    async fn insert_message(&self, record: InboundMessageRecord) -> Result<bool, BridgeError>;
    /// Newest records first, by `received_at`.
    async fn recent_messages(&self, limit: usize)
        -> Result<Vec<InboundMessageRecord>, BridgeError>;
}

/// In-process store implementing both [`DirectoryStore`] and [`MessageStore`].
///
/// Counts every write so callers can observe whether a pass touched storage.
#[derive(Default)]
pub struct InMemoryStore {
    units: RwLock<HashMap<String, DirectoryUnit>>,
    members: RwLock<HashMap<String, DirectoryMember>>,
    messages: RwLock<HashMap<String, InboundMessageRecord>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of successful writes since construction.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn units(&self) -> Vec<DirectoryUnit> {
        let mut units: Vec<_> = self.units.read().await.values().cloned().collect();
        units.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
        units
    }

    pub async fn members(&self) -> Vec<DirectoryMember> {
        let mut members: Vec<_> = self.members.read().await.values().cloned().collect();
        members.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
        members
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn find_unit(&self, remote_id: &str) -> Result<Option<DirectoryUnit>, BridgeError> {
        Ok(self.units.read().await.get(remote_id).cloned())
    }

    async fn save_unit(&self, unit: DirectoryUnit) -> Result<(), BridgeError> {
        self.units
            .write()
            .await
            .insert(unit.remote_id.clone(), unit);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_member(&self, remote_id: &str) -> Result<Option<DirectoryMember>, BridgeError> {
        Ok(self.members.read().await.get(remote_id).cloned())
    }

    async fn save_member(&self, member: DirectoryMember) -> Result<(), BridgeError> {
        self.members
            .write()
            .await
            .insert(member.remote_id.clone(), member);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count_units(&self) -> Result<usize, BridgeError> {
        Ok(self.units.read().await.len())
    }

    async fn count_members(&self) -> Result<usize, BridgeError> {
        Ok(self.members.read().await.len())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert_message(&self, record: InboundMessageRecord) -> Result<bool, BridgeError> {
        let mut messages = self.messages.write().await;
        if messages.contains_key(&record.message_id) {
            return Ok(false);
        }
        messages.insert(record.message_id.clone(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn recent_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<InboundMessageRecord>, BridgeError> {
        let mut records: Vec<_> = self.messages.read().await.values().cloned().collect();
        records.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        records.truncate(limit);
        Ok(records)
    }
}
