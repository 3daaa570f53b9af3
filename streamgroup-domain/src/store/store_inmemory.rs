//! 内存版消费组簿记（InMemoryGroupStore）
//!
//! 基于 `DashMap` 实现 `GroupStore` 协议：
//! - 每个消费组的全部状态（游标、成员、待确认条目）位于同一个条目下；
//! - 每个操作只在该条目的分片锁内同步执行，不跨越 `.await`，锁内即线性化点；
//! - 典型用途：测试环境、示例与单进程部署。
//!
use crate::error::{StreamError, StreamResult};
use crate::group::{Consumer, ConsumerGroup, GroupKey};
use crate::pending::{OwnerMatch, PendingEntry};
use crate::store::GroupStore;
use crate::value_object::{ConsumerId, CreateMode, EntryId, StartPosition, StreamName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

struct GroupState {
    group: ConsumerGroup,
    consumers: HashMap<ConsumerId, Consumer>,
    pending: BTreeMap<EntryId, PendingEntry>,
}

impl GroupState {
    fn new(group: ConsumerGroup) -> Self {
        Self {
            group,
            consumers: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    fn upsert_pending(
        &mut self,
        key: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> PendingEntry {
        let pending = self
            .pending
            .entry(entry_id)
            .and_modify(|p| p.redeliver(owner.clone(), now))
            .or_insert_with(|| PendingEntry::new(entry_id, key.clone(), owner.clone(), now));
        pending.clone()
    }

    fn check_owner(&self, entry_id: EntryId, owner: &ConsumerId) -> Option<OwnerMatch> {
        match self.pending.get(&entry_id) {
            None => Some(OwnerMatch::Missing),
            Some(p) if p.owner() != owner => Some(OwnerMatch::Mismatch {
                actual_owner: p.owner().clone(),
            }),
            Some(_) => None,
        }
    }
}

/// 简单的内存消费组簿记实现
#[derive(Default)]
pub struct InMemoryGroupStore {
    groups: DashMap<GroupKey, GroupState>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_group<R>(
        &self,
        key: &GroupKey,
        f: impl FnOnce(&mut GroupState) -> R,
    ) -> StreamResult<R> {
        let mut state = self
            .groups
            .get_mut(key)
            .ok_or_else(|| StreamError::GroupNotFound { group: key.clone() })?;
        Ok(f(state.value_mut()))
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn create_group(
        &self,
        group: &GroupKey,
        start: StartPosition,
        start_id: EntryId,
        mode: CreateMode,
        now: DateTime<Utc>,
    ) -> StreamResult<ConsumerGroup> {
        match self.groups.entry(group.clone()) {
            Entry::Occupied(existing) => {
                let existing = &existing.get().group;
                if mode == CreateMode::Strict && existing.conflicts_with(start, start_id) {
                    return Err(StreamError::AlreadyExists {
                        group: group.clone(),
                        existing_start: existing.start(),
                        requested_start: start,
                    });
                }
                Ok(existing.clone())
            }
            Entry::Vacant(slot) => {
                let created = ConsumerGroup::new(group.clone(), start, start_id, now);
                slot.insert(GroupState::new(created.clone()));
                info!(group = %group, start_id = %start_id, "Created consumer group");
                Ok(created)
            }
        }
    }

    async fn get_group(&self, group: &GroupKey) -> StreamResult<Option<ConsumerGroup>> {
        Ok(self.groups.get(group).map(|s| s.group.clone()))
    }

    async fn list_groups(&self, stream: &StreamName) -> StreamResult<Vec<ConsumerGroup>> {
        let mut groups: Vec<ConsumerGroup> = self
            .groups
            .iter()
            .filter(|s| s.key().stream() == stream)
            .map(|s| s.group.clone())
            .collect();
        groups.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(groups)
    }

    async fn deliver_new(
        &self,
        group: &GroupKey,
        expected_cursor: EntryId,
        ids: &[EntryId],
        owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<bool> {
        let Some(last) = ids.last().copied() else {
            return Ok(false);
        };

        self.with_group(group, |state| {
            if !state.group.compare_and_advance(expected_cursor, last) {
                return false;
            }
            for id in ids {
                state.upsert_pending(group, *id, owner, now);
            }
            true
        })
    }

    async fn record_delivery(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<PendingEntry> {
        self.with_group(group, |state| {
            state.upsert_pending(group, entry_id, owner, now)
        })
    }

    async fn transfer(
        &self,
        group: &GroupKey,
        observed: &PendingEntry,
        new_owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<Option<PendingEntry>> {
        self.with_group(group, |state| match state.pending.get_mut(&observed.entry_id()) {
            Some(current) if *current == *observed => {
                current.redeliver(new_owner.clone(), now);
                Some(current.clone())
            }
            _ => None,
        })
    }

    async fn remove_if_owner(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
    ) -> StreamResult<OwnerMatch> {
        self.with_group(group, |state| {
            if let Some(outcome) = state.check_owner(entry_id, owner) {
                return outcome;
            }
            match state.pending.remove(&entry_id) {
                Some(removed) => OwnerMatch::Matched(removed),
                None => OwnerMatch::Missing,
            }
        })
    }

    async fn mark_released(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
    ) -> StreamResult<OwnerMatch> {
        self.with_group(group, |state| {
            if let Some(outcome) = state.check_owner(entry_id, owner) {
                return outcome;
            }
            match state.pending.get_mut(&entry_id) {
                Some(pending) => {
                    let before = pending.clone();
                    pending.release();
                    OwnerMatch::Matched(before)
                }
                None => OwnerMatch::Missing,
            }
        })
    }

    async fn pending(&self, group: &GroupKey) -> StreamResult<Vec<PendingEntry>> {
        self.with_group(group, |state| state.pending.values().cloned().collect())
    }

    async fn pending_entry(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
    ) -> StreamResult<Option<PendingEntry>> {
        self.with_group(group, |state| state.pending.get(&entry_id).cloned())
    }

    async fn upsert_consumer(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<Consumer> {
        self.with_group(group, |state| {
            let entry = state
                .consumers
                .entry(consumer.clone())
                .and_modify(|c| c.touch(now))
                .or_insert_with(|| Consumer::new(consumer.clone(), group.clone(), now));
            entry.clone()
        })
    }

    async fn consumers(&self, group: &GroupKey) -> StreamResult<Vec<Consumer>> {
        self.with_group(group, |state| {
            let mut consumers: Vec<Consumer> = state.consumers.values().cloned().collect();
            consumers.sort_by(|a, b| a.id().cmp(b.id()));
            consumers
        })
    }

    async fn remove_consumer(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
    ) -> StreamResult<bool> {
        self.with_group(group, |state| state.consumers.remove(consumer).is_some())
    }

    async fn remove_consumer_if_idle(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        cutoff: DateTime<Utc>,
    ) -> StreamResult<bool> {
        self.with_group(group, |state| match state.consumers.get(consumer) {
            Some(c) if c.last_seen_at() < cutoff => {
                state.consumers.remove(consumer);
                true
            }
            _ => false,
        })
    }
}
