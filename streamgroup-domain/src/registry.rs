//! 消费组注册表（Consumer Group Registry）
//!
//! 负责消费组的创建与消费者成员关系：
//! - `create_group`：按起始位置解析初始游标并创建（默认幂等）；
//! - `register_consumer`：注册或刷新消费者，供分发器的公平份额计算使用；
//! - `sweep_idle_consumers`：清理超过阈值未活跃的消费者，其待确认条目保留，
//!   所有权只会因超时回收而终止。
//!
use crate::clock::Clock;
use crate::error::{StreamError, StreamResult};
use crate::group::{Consumer, ConsumerGroup, GroupKey};
use crate::log::StreamLog;
use crate::retry::{RetryPolicy, retry};
use crate::store::GroupStore;
use crate::value_object::{ConsumerId, CreateMode, EntryId, StartPosition};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct ConsumerGroupRegistry {
    log: Arc<dyn StreamLog>,
    store: Arc<dyn GroupStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl ConsumerGroupRegistry {
    pub fn new(
        log: Arc<dyn StreamLog>,
        store: Arc<dyn GroupStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            log,
            store,
            clock,
            retry,
        }
    }

    /// 创建消费组
    ///
    /// `IfNotExists` 下重复创建直接返回现有消费组；`Strict` 下解析出的初始游标
    /// 不同则返回 `AlreadyExists`，相同（或两次都是 `Tail`）则为 no-op。
    pub async fn create_group(
        &self,
        key: &GroupKey,
        start: StartPosition,
        mode: CreateMode,
    ) -> StreamResult<ConsumerGroup> {
        let tail = retry(&self.retry, "tail", move || self.log.tail(key.stream())).await?;
        let start_id = match start {
            StartPosition::Beginning => EntryId::ZERO,
            StartPosition::Tail => tail,
            StartPosition::After(id) if id > tail => {
                return Err(StreamError::invalid_argument(format!(
                    "start position {id} is beyond the tail {tail} of stream {}",
                    key.stream()
                )));
            }
            StartPosition::After(id) => id,
        };

        self.store
            .create_group(key, start, start_id, mode, self.clock.now())
            .await
    }

    pub async fn group(&self, key: &GroupKey) -> StreamResult<ConsumerGroup> {
        self.store
            .get_group(key)
            .await?
            .ok_or_else(|| StreamError::GroupNotFound { group: key.clone() })
    }

    /// 注册消费者或刷新其最近活跃时间
    pub async fn register_consumer(
        &self,
        key: &GroupKey,
        consumer: &ConsumerId,
    ) -> StreamResult<Consumer> {
        if consumer.is_blank() {
            return Err(StreamError::invalid_argument("consumer id must not be blank"));
        }
        self.store
            .upsert_consumer(key, consumer, self.clock.now())
            .await
    }

    pub async fn unregister_consumer(
        &self,
        key: &GroupKey,
        consumer: &ConsumerId,
    ) -> StreamResult<bool> {
        let removed = self.store.remove_consumer(key, consumer).await?;
        if removed {
            debug!(group = %key, consumer = %consumer, "Unregistered consumer");
        }
        Ok(removed)
    }

    pub async fn live_consumers(&self, key: &GroupKey) -> StreamResult<Vec<Consumer>> {
        self.store.consumers(key).await
    }

    /// 清理空闲消费者，返回被移除的消费者
    ///
    /// 观测与移除之间若消费者又刷新过活跃时间，则条件移除失败并保留该消费者。
    pub async fn sweep_idle_consumers(
        &self,
        key: &GroupKey,
        idle_threshold: Duration,
    ) -> StreamResult<Vec<ConsumerId>> {
        let threshold = chrono::TimeDelta::from_std(idle_threshold)
            .map_err(|e| StreamError::invalid_argument(format!("idle threshold: {e}")))?;
        let cutoff = self.clock.now() - threshold;

        let mut removed = Vec::new();
        for consumer in self.store.consumers(key).await? {
            if consumer.last_seen_at() >= cutoff {
                continue;
            }
            if self
                .store
                .remove_consumer_if_idle(key, consumer.id(), cutoff)
                .await?
            {
                removed.push(consumer.id().clone());
            }
        }

        if !removed.is_empty() {
            info!(group = %key, removed = removed.len(), "Swept idle consumers");
        }
        Ok(removed)
    }
}
