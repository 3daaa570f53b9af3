//! 运维监控（Monitor）
//!
//! - `GroupMonitor`：待确认数、消费滞后量（日志尾部 - 游标）与最老待确认条目时长；
//! - `ThroughputReporter`：按固定间隔采样流长度，输出平均处理速率。
//!
use crate::clock::Clock;
use crate::error::{StreamError, StreamResult};
use crate::group::GroupKey;
use crate::log::StreamLog;
use crate::pending::PendingEntryTable;
use crate::retry::{RetryPolicy, retry};
use crate::store::GroupStore;
use crate::value_object::{ConsumerId, StreamName};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// 消费组状态快照
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub pending_count: usize,
    pub consumer_lag: u64,
    pub oldest_pending_age: Option<Duration>,
    pub consumers: Vec<ConsumerId>,
}

#[derive(Clone)]
pub struct GroupMonitor {
    log: Arc<dyn StreamLog>,
    store: Arc<dyn GroupStore>,
    pending: PendingEntryTable,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl GroupMonitor {
    pub fn new(
        log: Arc<dyn StreamLog>,
        store: Arc<dyn GroupStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            log,
            pending: PendingEntryTable::new(store.clone()),
            store,
            clock,
            retry,
        }
    }

    pub async fn pending_count(&self, group: &GroupKey) -> StreamResult<usize> {
        self.pending.count(group).await
    }

    /// 日志尾部与游标之差
    pub async fn consumer_lag(&self, group: &GroupKey) -> StreamResult<u64> {
        let cursor = self
            .store
            .get_group(group)
            .await?
            .ok_or_else(|| StreamError::GroupNotFound { group: group.clone() })?
            .last_delivered_id();
        let tail = retry(&self.retry, "tail", move || self.log.tail(group.stream())).await?;
        Ok(tail.distance_from(cursor))
    }

    /// 最老待确认条目自投递起的时长；没有待确认条目时为 `None`
    pub async fn oldest_pending_age(&self, group: &GroupKey) -> StreamResult<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .store
            .pending(group)
            .await?
            .iter()
            .map(|p| p.age(now))
            .max())
    }

    pub async fn snapshot(&self, group: &GroupKey) -> StreamResult<GroupStats> {
        let now = self.clock.now();
        let pending = self.store.pending(group).await?;
        let consumers = self
            .store
            .consumers(group)
            .await?
            .into_iter()
            .map(|c| c.id().clone())
            .collect();

        Ok(GroupStats {
            pending_count: pending.len(),
            consumer_lag: self.consumer_lag(group).await?,
            oldest_pending_age: pending.iter().map(|p| p.age(now)).max(),
            consumers,
        })
    }

    /// 同一个流上所有消费组的快照，按组名排序
    pub async fn snapshot_stream(
        &self,
        stream: &StreamName,
    ) -> StreamResult<Vec<(GroupKey, GroupStats)>> {
        let mut snapshots = Vec::new();
        for group in self.store.list_groups(stream).await? {
            let stats = self.snapshot(group.key()).await?;
            snapshots.push((group.key().clone(), stats));
        }
        Ok(snapshots)
    }
}

/// 吞吐上报：两次采样之间流长度的增量除以采样间隔
pub struct ThroughputReporter {
    log: Arc<dyn StreamLog>,
    stream: StreamName,
    interval: Duration,
    last_len: AtomicU64,
}

impl ThroughputReporter {
    pub fn new(log: Arc<dyn StreamLog>, stream: StreamName, interval: Duration) -> Self {
        Self {
            log,
            stream,
            interval,
            last_len: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 采样一次并输出平均速率（条/秒）
    pub async fn report(&self) -> StreamResult<u64> {
        let len = self.log.len(&self.stream).await?;
        let previous = self.last_len.swap(len, Ordering::SeqCst);
        let secs = self.interval.as_secs().max(1);
        let rate = len.saturating_sub(previous) / secs;
        info!(
            stream = %self.stream,
            length = len,
            "Average processing speed for the last {} seconds: {} m/s",
            secs,
            rate
        );
        Ok(rate)
    }

    /// 周期上报，直到 `token` 被取消
    #[cfg(feature = "runtime")]
    pub fn spawn(
        self: Arc<Self>,
        token: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        use tokio::time::{self, MissedTickBehavior};

        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.report().await {
                            tracing::warn!(stream = %self.stream, error = %e, "Throughput sample failed");
                        }
                    }
                }
            }
        })
    }
}
