//! 分发器（Dispatcher）
//!
//! 回答“这个消费者接下来处理什么”，并保证同组内的投递排他：
//! 1. 先从可回收池认领超时条目（所有权比较并转移，次数加一）；
//! 2. 批次未满时，从游标之后读取新条目，以“比较并推进游标 + 登记待确认条目”
//!    的单个原子操作完成归属；游标被并发推进时重新读取并重试；
//! 3. 返回“回收在前、新条目在后”的拼接结果，两段内部都按位点升序。
//!
//! 拉取是非阻塞的：可用条目不足时立即返回部分或空结果。
//!
use crate::clock::{Clock, system_clock};
use crate::entry::{Delivery, Entry};
use crate::error::{StreamError, StreamResult};
use crate::group::GroupKey;
use crate::log::StreamLog;
use crate::monitor::GroupMonitor;
use crate::pending::{PendingEntry, PendingEntryTable};
use crate::reclaimer::Reclaimer;
use crate::registry::ConsumerGroupRegistry;
use crate::retry::{RetryPolicy, retry};
use crate::store::GroupStore;
use crate::value_object::{ConsumerId, EntryId};
use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 分发器配置
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// 待确认条目的租约时长，超过即可被其他消费者认领
    #[builder(default = Duration::from_secs(30))]
    pub claim_timeout: Duration,
    /// 游标比较并推进冲突时的最大重试次数
    #[builder(default = 16)]
    pub max_cas_retries: usize,
    /// 按存活消费者数均分滞后量，限制单次拉取的新条目数
    #[builder(default)]
    pub fair_share: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            claim_timeout: Duration::from_secs(30),
            max_cas_retries: 16,
            fair_share: false,
        }
    }
}

#[derive(Builder)]
pub struct Dispatcher {
    log: Arc<dyn StreamLog>,
    store: Arc<dyn GroupStore>,
    #[builder(default = system_clock())]
    clock: Arc<dyn Clock>,
    #[builder(default)]
    retry: RetryPolicy,
    #[builder(default)]
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn registry(&self) -> ConsumerGroupRegistry {
        ConsumerGroupRegistry::new(
            self.log.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.retry,
        )
    }

    pub fn pending(&self) -> PendingEntryTable {
        PendingEntryTable::new(self.store.clone())
    }

    pub fn reclaimer(&self) -> Reclaimer {
        Reclaimer::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.claim_timeout,
        )
    }

    pub fn monitor(&self) -> GroupMonitor {
        GroupMonitor::new(
            self.log.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.retry,
        )
    }

    /// 为 `consumer` 拉取最多 `batch_size` 条：回收条目在前，新条目在后
    ///
    /// 每次拉取都会注册或刷新该消费者。
    pub async fn poll(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        batch_size: usize,
    ) -> StreamResult<Vec<Delivery>> {
        if batch_size == 0 {
            return Err(StreamError::invalid_argument("batch_size must be positive"));
        }
        if consumer.is_blank() {
            return Err(StreamError::invalid_argument("consumer id must not be blank"));
        }

        self.store
            .upsert_consumer(group, consumer, self.clock.now())
            .await?;

        let mut deliveries = self.deliver_reclaimed(group, consumer, batch_size).await?;
        let remaining = batch_size - deliveries.len();
        if remaining > 0 {
            match self.deliver_new(group, consumer, remaining).await {
                Ok(new) => deliveries.extend(new),
                // 已认领的条目照常交付，游标未动，新条目留给下一次拉取
                Err(err) if !deliveries.is_empty() => {
                    warn!(
                        group = %group,
                        consumer = %consumer,
                        reclaimed = deliveries.len(),
                        error = %err,
                        "Reading new entries failed, delivering reclaimed entries only"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        if !deliveries.is_empty() {
            debug!(
                group = %group,
                consumer = %consumer,
                delivered = deliveries.len(),
                reclaimed = deliveries.iter().filter(|d| d.is_reclaimed()).count(),
                "Polled entries"
            );
        }
        Ok(deliveries)
    }

    /// 确认：仅当前属主可以确认
    pub async fn ack(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        entry_id: EntryId,
    ) -> StreamResult<()> {
        if consumer.is_blank() {
            return Err(StreamError::invalid_argument("consumer id must not be blank"));
        }
        self.pending()
            .acknowledge(group, entry_id, consumer)
            .await
            .map(|_| ())
    }

    /// 显式放弃：条目立即进入可回收状态
    pub async fn release(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        entry_id: EntryId,
    ) -> StreamResult<()> {
        if consumer.is_blank() {
            return Err(StreamError::invalid_argument("consumer id must not be blank"));
        }
        self.pending()
            .release(group, entry_id, consumer)
            .await
            .map(|_| ())
    }

    /// 交还 `consumer` 当前持有的全部条目，返回成功释放的数量
    ///
    /// 期间被他人认领或已确认的条目跳过。
    pub async fn release_owned(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
    ) -> StreamResult<usize> {
        let table = self.pending();
        let mut released = 0;
        for pending in table.list_by_owner(group, consumer).await? {
            match table.release(group, pending.entry_id(), consumer).await {
                Ok(_) => released += 1,
                Err(StreamError::NotFound { .. } | StreamError::OwnershipMismatch { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(released)
    }

    /// `consumer` 当前持有的待确认条目
    pub async fn pending_for(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
    ) -> StreamResult<Vec<PendingEntry>> {
        self.pending().list_by_owner(group, consumer).await
    }

    /// 认领超时条目并从日志取回负载
    ///
    /// 某条取回失败时，尚未交付的认领立即标记释放（不必等待下一轮超时），
    /// 已取回的照常返回；一条都没有取回时返回错误。
    async fn deliver_reclaimed(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        limit: usize,
    ) -> StreamResult<Vec<Delivery>> {
        let claimed = self.reclaimer().claim_expired(group, consumer, limit).await?;

        let mut deliveries = Vec::with_capacity(claimed.len());
        for (idx, pending) in claimed.iter().enumerate() {
            match self.fetch_claimed(group, consumer, pending).await {
                Ok(Some(delivery)) => deliveries.push(delivery),
                Ok(None) => {}
                Err(err) => {
                    self.release_claims(group, consumer, &claimed[idx..]).await;
                    if deliveries.is_empty() {
                        return Err(err);
                    }
                    warn!(
                        group = %group,
                        consumer = %consumer,
                        delivered = deliveries.len(),
                        released = claimed.len() - idx,
                        error = %err,
                        "Fetching claimed entries failed, delivering the fetched ones"
                    );
                    break;
                }
            }
        }
        Ok(deliveries)
    }

    async fn fetch_claimed(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        pending: &PendingEntry,
    ) -> StreamResult<Option<Delivery>> {
        let id = pending.entry_id();
        let fetched = retry(&self.retry, "fetch", move || {
            self.log.fetch(group.stream(), id)
        })
        .await?;

        match fetched {
            Some(entry) => Ok(Some(Delivery::new(entry, pending.delivery_count(), true))),
            None => {
                // 条目已被显式截断，无法再投递
                warn!(
                    group = %group,
                    entry_id = %id,
                    delivery_count = pending.delivery_count(),
                    "Claimed entry is gone from the log, dropping it from pending"
                );
                self.store.remove_if_owner(group, id, consumer).await?;
                Ok(None)
            }
        }
    }

    /// 交还未能交付的认领；尽力而为，逐条记录失败
    async fn release_claims(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        claims: &[PendingEntry],
    ) {
        for pending in claims {
            if let Err(e) = self
                .store
                .mark_released(group, pending.entry_id(), consumer)
                .await
            {
                warn!(
                    group = %group,
                    consumer = %consumer,
                    entry_id = %pending.entry_id(),
                    error = %e,
                    "Releasing undelivered claim failed"
                );
            }
        }
    }

    async fn deliver_new(
        &self,
        group: &GroupKey,
        consumer: &ConsumerId,
        remaining: usize,
    ) -> StreamResult<Vec<Delivery>> {
        let mut conflicts = 0;

        loop {
            let cursor = self
                .store
                .get_group(group)
                .await?
                .ok_or_else(|| StreamError::GroupNotFound { group: group.clone() })?
                .last_delivered_id();

            let limit = if self.config.fair_share {
                remaining.min(self.fair_share_cap(group, cursor).await?)
            } else {
                remaining
            };

            let entries: Vec<Entry> = retry(&self.retry, "read_range", move || {
                self.log.read_range(group.stream(), cursor, limit)
            })
            .await?;
            let Some(last) = entries.last().map(Entry::id) else {
                return Ok(Vec::new());
            };

            let ids: Vec<EntryId> = entries.iter().map(Entry::id).collect();
            if self
                .store
                .deliver_new(group, cursor, &ids, consumer, self.clock.now())
                .await?
            {
                debug!(
                    group = %group,
                    consumer = %consumer,
                    from = %cursor,
                    to = %last,
                    "Advanced group cursor"
                );
                return Ok(entries
                    .into_iter()
                    .map(|entry| Delivery::new(entry, 1, false))
                    .collect());
            }

            conflicts += 1;
            if conflicts > self.config.max_cas_retries {
                debug!(
                    group = %group,
                    consumer = %consumer,
                    conflicts,
                    "Cursor contention, returning without new entries"
                );
                return Ok(Vec::new());
            }
        }
    }

    /// ceil(滞后量 / 存活消费者数)，至少为 1
    async fn fair_share_cap(&self, group: &GroupKey, cursor: EntryId) -> StreamResult<usize> {
        let tail = retry(&self.retry, "tail", move || self.log.tail(group.stream())).await?;
        let lag = tail.distance_from(cursor);
        let live = self.store.consumers(group).await?.len().max(1) as u64;
        let cap = lag.div_ceil(live).max(1);
        Ok(usize::try_from(cap).unwrap_or(usize::MAX))
    }
}
