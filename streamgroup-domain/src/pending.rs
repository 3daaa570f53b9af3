//! 待确认条目表（Pending Entry Table）
//!
//! 每个消费组一张表，记录“已投递未确认”的条目及其属主与投递时间。
//! 所有权是基于时间的租约而非锁：属主崩溃只会推迟回收，不会阻塞系统。
//!
//! 表本身不持有状态，所有读写都落在 `GroupStore` 的原子原语上。
//!
use crate::clock::elapsed;
use crate::error::{StreamError, StreamResult};
use crate::group::GroupKey;
use crate::store::GroupStore;
use crate::value_object::{ConsumerId, EntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    entry_id: EntryId,
    group: GroupKey,
    owner: ConsumerId,
    delivered_at: DateTime<Utc>,
    /// 投递次数，始终 >= 1
    delivery_count: u32,
    /// 属主主动释放（快速进入可回收状态）
    released: bool,
}

impl PendingEntry {
    pub fn new(
        entry_id: EntryId,
        group: GroupKey,
        owner: ConsumerId,
        delivered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id,
            group,
            owner,
            delivered_at,
            delivery_count: 1,
            released: false,
        }
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    pub fn owner(&self) -> &ConsumerId {
        &self.owner
    }

    pub fn delivered_at(&self) -> DateTime<Utc> {
        self.delivered_at
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// 已释放，或自投递起超过 `timeout`
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.released || elapsed(now, self.delivered_at) > timeout
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        elapsed(now, self.delivered_at)
    }

    /// 重新投递：更换属主、刷新投递时间、投递次数加一
    pub(crate) fn redeliver(&mut self, owner: ConsumerId, now: DateTime<Utc>) {
        self.owner = owner;
        self.delivered_at = now;
        self.delivery_count = self.delivery_count.saturating_add(1);
        self.released = false;
    }

    pub(crate) fn release(&mut self) {
        self.released = true;
    }
}

/// 按属主条件操作待确认条目的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerMatch {
    /// 属主匹配，操作已生效（携带操作前的记录）
    Matched(PendingEntry),
    /// 表中不存在该条目（已确认或从未投递）
    Missing,
    /// 条目已属于其他消费者
    Mismatch { actual_owner: ConsumerId },
}

#[derive(Clone)]
pub struct PendingEntryTable {
    store: Arc<dyn GroupStore>,
}

impl PendingEntryTable {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self { store }
    }

    /// 记录一次投递：不存在则插入（次数为 1），存在则覆盖属主并递增次数
    pub async fn record_delivery(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<PendingEntry> {
        let pending = self
            .store
            .record_delivery(group, entry_id, owner, now)
            .await?;
        debug!(
            group = %group,
            entry_id = %entry_id,
            owner = %owner,
            delivery_count = pending.delivery_count(),
            "Recorded delivery"
        );
        Ok(pending)
    }

    /// 确认：仅当 `owner` 仍是当前属主时移除
    ///
    /// 属主不匹配时返回 `OwnershipMismatch`（条目已被回收给他人），该确认被丢弃、不重试；
    /// 条目不存在时返回 `NotFound`，重复确认因此不会破坏状态。
    pub async fn acknowledge(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
    ) -> StreamResult<PendingEntry> {
        match self.store.remove_if_owner(group, entry_id, owner).await? {
            OwnerMatch::Matched(pending) => {
                debug!(group = %group, entry_id = %entry_id, owner = %owner, "Acknowledged entry");
                Ok(pending)
            }
            OwnerMatch::Missing => Err(StreamError::not_found(format!(
                "pending entry {entry_id} in group {group}"
            ))),
            OwnerMatch::Mismatch { actual_owner } => {
                warn!(
                    group = %group,
                    entry_id = %entry_id,
                    owner = %owner,
                    actual_owner = %actual_owner,
                    "Dropping stale acknowledgement"
                );
                Err(StreamError::OwnershipMismatch {
                    group: group.clone(),
                    entry_id,
                    owner: owner.clone(),
                    actual_owner,
                })
            }
        }
    }

    /// 释放：属主主动放弃，条目立即可被回收
    pub async fn release(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
    ) -> StreamResult<PendingEntry> {
        match self.store.mark_released(group, entry_id, owner).await? {
            OwnerMatch::Matched(pending) => {
                debug!(group = %group, entry_id = %entry_id, owner = %owner, "Released entry");
                Ok(pending)
            }
            OwnerMatch::Missing => Err(StreamError::not_found(format!(
                "pending entry {entry_id} in group {group}"
            ))),
            OwnerMatch::Mismatch { actual_owner } => Err(StreamError::OwnershipMismatch {
                group: group.clone(),
                entry_id,
                owner: owner.clone(),
                actual_owner,
            }),
        }
    }

    /// 超时（或已释放）的条目，按位点升序
    pub async fn list_expired(
        &self,
        group: &GroupKey,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> StreamResult<Vec<PendingEntry>> {
        let mut expired: Vec<PendingEntry> = self
            .store
            .pending(group)
            .await?
            .into_iter()
            .filter(|p| p.is_expired(now, timeout))
            .collect();
        expired.sort_by_key(PendingEntry::entry_id);
        Ok(expired)
    }

    /// 某个消费者当前持有的条目（用于关闭时交还）
    pub async fn list_by_owner(
        &self,
        group: &GroupKey,
        owner: &ConsumerId,
    ) -> StreamResult<Vec<PendingEntry>> {
        let mut owned: Vec<PendingEntry> = self
            .store
            .pending(group)
            .await?
            .into_iter()
            .filter(|p| p.owner() == owner)
            .collect();
        owned.sort_by_key(PendingEntry::entry_id);
        Ok(owned)
    }

    pub async fn get(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
    ) -> StreamResult<Option<PendingEntry>> {
        self.store.pending_entry(group, entry_id).await
    }

    pub async fn count(&self, group: &GroupKey) -> StreamResult<usize> {
        Ok(self.store.pending(group).await?.len())
    }
}
