//! 消费组簿记协议（GroupStore）
//!
use crate::error::StreamResult;
use crate::group::{Consumer, ConsumerGroup, GroupKey};
use crate::pending::{OwnerMatch, PendingEntry};
use crate::value_object::{ConsumerId, CreateMode, EntryId, StartPosition, StreamName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 消费组簿记：所有方法对单个消费组原子生效
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// 创建消费组；已存在时按 `mode` 返回现有消费组或 `AlreadyExists`
    async fn create_group(
        &self,
        group: &GroupKey,
        start: StartPosition,
        start_id: EntryId,
        mode: CreateMode,
        now: DateTime<Utc>,
    ) -> StreamResult<ConsumerGroup>;

    async fn get_group(&self, group: &GroupKey) -> StreamResult<Option<ConsumerGroup>>;

    async fn list_groups(&self, stream: &StreamName) -> StreamResult<Vec<ConsumerGroup>>;

    /// 分发新条目：游标仍为 `expected_cursor` 时，一次性推进到 `ids` 的最后一个
    /// 并为每个位点登记待确认条目；否则不做任何修改并返回 `false`
    async fn deliver_new(
        &self,
        group: &GroupKey,
        expected_cursor: EntryId,
        ids: &[EntryId],
        owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<bool>;

    /// 插入或覆盖待确认条目（覆盖时投递次数加一）
    async fn record_delivery(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<PendingEntry>;

    /// 所有权比较并转移：仅当当前记录仍与 `observed` 完全一致时转给 `new_owner`
    async fn transfer(
        &self,
        group: &GroupKey,
        observed: &PendingEntry,
        new_owner: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<Option<PendingEntry>>;

    /// 属主匹配时移除待确认条目
    async fn remove_if_owner(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
    ) -> StreamResult<OwnerMatch>;

    /// 属主匹配时标记为已释放
    async fn mark_released(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
        owner: &ConsumerId,
    ) -> StreamResult<OwnerMatch>;

    /// 全部待确认条目，按位点升序
    async fn pending(&self, group: &GroupKey) -> StreamResult<Vec<PendingEntry>>;

    async fn pending_entry(
        &self,
        group: &GroupKey,
        entry_id: EntryId,
    ) -> StreamResult<Option<PendingEntry>>;

    /// 注册或刷新消费者的最近活跃时间
    async fn upsert_consumer(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        now: DateTime<Utc>,
    ) -> StreamResult<Consumer>;

    async fn consumers(&self, group: &GroupKey) -> StreamResult<Vec<Consumer>>;

    async fn remove_consumer(&self, group: &GroupKey, consumer: &ConsumerId)
    -> StreamResult<bool>;

    /// 仅当消费者最近活跃时间仍早于 `cutoff` 时移除（期间刷新过则保留）
    async fn remove_consumer_if_idle(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        cutoff: DateTime<Utc>,
    ) -> StreamResult<bool>;
}
