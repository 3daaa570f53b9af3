//! 消费者运行时引擎（ConsumerRuntime）
//!
//! 编排单个消费者的长驻任务：
//! - 轮询任务：拉取 → 并发处理 → 成功确认 / 失败放弃；批次满时立即继续拉取，
//!   否则按 `poll_interval` 休眠；
//! - 清理任务：周期清理组内空闲消费者；
//! - 关闭：交还（或保留至超时）自己持有的条目，注销消费者，状态置为 `Stopped`。
//!
use super::state::{RuntimeState, RuntimeStats, RuntimeStatsSnapshot};
use super::EntryHandler;
use crate::dispatcher::Dispatcher;
use crate::entry::Delivery;
use crate::error::{StreamError, StreamResult};
use crate::group::GroupKey;
use crate::value_object::ConsumerId;
use bon::Builder;
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 消费者运行时配置
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 没有可处理条目时的轮询间隔
    #[builder(default = Duration::from_millis(100))]
    pub poll_interval: Duration,
    /// 单次拉取的最大条目数
    #[builder(default = 10)]
    pub batch_size: usize,
    /// 同一批次内的处理并发
    #[builder(default = 8)]
    pub handler_concurrency: usize,
    /// 处理失败时立即释放条目（否则等待超时回收）
    #[builder(default = true)]
    pub release_on_failure: bool,
    /// 关闭时释放仍持有的条目
    #[builder(default = true)]
    pub release_on_shutdown: bool,
    /// 空闲消费者清理间隔
    #[builder(default = Duration::from_secs(30))]
    pub sweep_interval: Duration,
    /// 超过该时长未拉取的消费者视为空闲
    #[builder(default = Duration::from_secs(60))]
    pub idle_threshold: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            batch_size: 10,
            handler_concurrency: 8,
            release_on_failure: true,
            release_on_shutdown: true,
            sweep_interval: Duration::from_secs(30),
            idle_threshold: Duration::from_secs(60),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.batch_size == 0 {
            return Err(StreamError::invalid_argument("batch_size must be positive"));
        }
        if self.poll_interval.is_zero() || self.sweep_interval.is_zero() {
            return Err(StreamError::invalid_argument(
                "poll_interval and sweep_interval must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Builder)]
pub struct ConsumerRuntime {
    dispatcher: Arc<Dispatcher>,
    group: GroupKey,
    #[builder(default = ConsumerId::random())]
    consumer_id: ConsumerId,
    handler: Arc<dyn EntryHandler>,
    #[builder(default)]
    config: RuntimeConfig,
    #[builder(skip)]
    stats: Arc<RuntimeStats>,
}

impl ConsumerRuntime {
    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }

    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    /// 启动运行时，返回可用于关闭/等待/观察状态的句柄
    ///
    /// 配置非法（如 `batch_size` 为 0）时拒绝启动。
    pub fn start(self: Arc<Self>) -> StreamResult<RuntimeHandle> {
        self.config.validate()?;

        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RuntimeState::Idle);
        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(2);

        // sweep worker（周期任务）
        {
            let registry = self.dispatcher.registry();
            let group = self.group.clone();
            let threshold = self.config.idle_threshold;

            tasks.push(Self::spawn_periodic(
                token.clone(),
                self.config.sweep_interval,
                move || {
                    let registry = registry.clone();
                    let group = group.clone();
                    async move {
                        if let Err(e) = registry.sweep_idle_consumers(&group, threshold).await {
                            warn!(group = %group, error = %e, "Idle consumer sweep failed");
                        }
                    }
                },
            ));
        }

        // poll worker（长循环）
        tasks.push(tokio::spawn(Self::poll_loop(
            self.clone(),
            token.clone(),
            state_tx,
        )));

        Ok(RuntimeHandle {
            token,
            tasks,
            state: state_rx,
            stats: self.stats.clone(),
            consumer_id: self.consumer_id.clone(),
        })
    }

    fn spawn_periodic<F, Fut>(
        token: CancellationToken,
        interval: Duration,
        mut f: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => f().await,
                }
            }
        })
    }

    async fn poll_loop(
        self: Arc<Self>,
        token: CancellationToken,
        state: watch::Sender<RuntimeState>,
    ) {
        info!(group = %self.group, consumer = %self.consumer_id, "Consumer runtime started");

        while !token.is_cancelled() {
            state.send_replace(RuntimeState::Polling);
            let deliveries = match self
                .dispatcher
                .poll(&self.group, &self.consumer_id, self.config.batch_size)
                .await
            {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    warn!(group = %self.group, consumer = %self.consumer_id, error = %e, "Poll failed");
                    Vec::new()
                }
            };

            let full = deliveries.len() >= self.config.batch_size;
            if !deliveries.is_empty() {
                RuntimeStats::add(&self.stats.delivered, deliveries.len() as u64);
                state.send_replace(RuntimeState::Processing);
                self.process_batch(deliveries, &state).await;
            }
            state.send_replace(RuntimeState::Idle);

            if !full {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        self.hand_back(&state).await;
        state.send_replace(RuntimeState::Stopped);
        info!(group = %self.group, consumer = %self.consumer_id, "Consumer runtime stopped");
    }

    async fn process_batch(&self, deliveries: Vec<Delivery>, state: &watch::Sender<RuntimeState>) {
        let concurrency = self.config.handler_concurrency.max(1);

        stream::iter(deliveries)
            .for_each_concurrent(Some(concurrency), move |delivery| async move {
                match self.handler.handle(&delivery).await {
                    Ok(()) => {
                        state.send_replace(RuntimeState::Acking);
                        self.acknowledge(&delivery).await;
                    }
                    Err(err) => {
                        state.send_replace(RuntimeState::Abandoning);
                        self.abandon(&delivery, &err).await;
                    }
                }
            })
            .await;
    }

    async fn acknowledge(&self, delivery: &Delivery) {
        match self
            .dispatcher
            .ack(&self.group, &self.consumer_id, delivery.id())
            .await
        {
            Ok(()) => RuntimeStats::add(&self.stats.processed, 1),
            // 处理超时期间已被他人认领：确认被丢弃，不重试
            Err(StreamError::OwnershipMismatch { .. }) => {
                RuntimeStats::add(&self.stats.stale_acks, 1);
            }
            Err(e) => {
                warn!(
                    group = %self.group,
                    consumer = %self.consumer_id,
                    entry_id = %delivery.id(),
                    error = %e,
                    "Acknowledgement failed"
                );
            }
        }
    }

    async fn abandon(&self, delivery: &Delivery, err: &anyhow::Error) {
        RuntimeStats::add(&self.stats.failed, 1);
        let failure = StreamError::handler(self.handler.handler_name(), err);
        error!(
            group = %self.group,
            consumer = %self.consumer_id,
            entry_id = %delivery.id(),
            delivery_count = delivery.delivery_count(),
            error = %failure,
            "Entry handler failed"
        );

        if !self.config.release_on_failure {
            return;
        }
        match self
            .dispatcher
            .release(&self.group, &self.consumer_id, delivery.id())
            .await
        {
            Ok(()) => RuntimeStats::add(&self.stats.released, 1),
            Err(e) => {
                debug!(
                    group = %self.group,
                    consumer = %self.consumer_id,
                    entry_id = %delivery.id(),
                    error = %e,
                    "Release after failure skipped"
                );
            }
        }
    }

    /// 关闭前交还持有的条目并注销
    async fn hand_back(&self, state: &watch::Sender<RuntimeState>) {
        match self
            .dispatcher
            .pending_for(&self.group, &self.consumer_id)
            .await
        {
            Ok(owned) if !owned.is_empty() => {
                state.send_replace(RuntimeState::Abandoning);
                if self.config.release_on_shutdown {
                    match self
                        .dispatcher
                        .release_owned(&self.group, &self.consumer_id)
                        .await
                    {
                        Ok(n) => {
                            RuntimeStats::add(&self.stats.released, n as u64);
                            info!(
                                group = %self.group,
                                consumer = %self.consumer_id,
                                released = n,
                                "Released owned entries on shutdown"
                            );
                        }
                        Err(e) => {
                            warn!(group = %self.group, consumer = %self.consumer_id, error = %e, "Release on shutdown failed");
                        }
                    }
                } else {
                    info!(
                        group = %self.group,
                        consumer = %self.consumer_id,
                        owned = owned.len(),
                        "Leaving owned entries to the claim timeout"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(group = %self.group, consumer = %self.consumer_id, error = %e, "Listing owned entries failed");
            }
        }

        if let Err(e) = self
            .dispatcher
            .registry()
            .unregister_consumer(&self.group, &self.consumer_id)
            .await
        {
            warn!(group = %self.group, consumer = %self.consumer_id, error = %e, "Unregister failed");
        }
    }
}

/// 运行时句柄：用于优雅关闭、等待任务结束与观察状态
pub struct RuntimeHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    state: watch::Receiver<RuntimeState>,
    stats: Arc<RuntimeStats>,
    consumer_id: ConsumerId,
}

impl RuntimeHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    /// 状态变化流（从当前状态开始）
    pub fn state_changes(&self) -> BoxStream<'static, RuntimeState> {
        Box::pin(WatchStream::new(self.state.clone()))
    }

    pub fn stats(&self) -> RuntimeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{InMemoryStreamLog, StreamLog};
    use crate::store::InMemoryGroupStore;
    use crate::value_object::{CreateMode, EntryId, StartPosition};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct SpyHandler {
        fail_on: HashSet<u64>,
        handled: Mutex<Vec<(u64, u32)>>,
    }

    impl SpyHandler {
        fn failing(ids: &[u64]) -> Self {
            Self {
                fail_on: ids.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn attempts(&self, id: u64) -> Vec<u32> {
            self.handled
                .lock()
                .unwrap()
                .iter()
                .filter(|(i, _)| *i == id)
                .map(|(_, count)| *count)
                .collect()
        }
    }

    #[async_trait]
    impl EntryHandler for SpyHandler {
        fn handler_name(&self) -> &str {
            "spy"
        }

        async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()> {
            let id = delivery.id().value();
            self.handled
                .lock()
                .unwrap()
                .push((id, delivery.delivery_count()));
            if self.fail_on.contains(&id) {
                anyhow::bail!("fail requested for {id}");
            }
            Ok(())
        }
    }

    async fn setup(entries: usize) -> (Arc<Dispatcher>, GroupKey) {
        let log = Arc::new(InMemoryStreamLog::default());
        let key = GroupKey::new("s", "g");
        for i in 0..entries {
            log.append(key.stream(), Bytes::from(format!("{i}")))
                .await
                .unwrap();
        }
        let dispatcher = Arc::new(
            Dispatcher::builder()
                .log(log)
                .store(Arc::new(InMemoryGroupStore::new()))
                .build(),
        );
        dispatcher
            .registry()
            .create_group(&key, StartPosition::Beginning, CreateMode::IfNotExists)
            .await
            .unwrap();
        (dispatcher, key)
    }

    fn fast_config() -> RuntimeConfig {
        RuntimeConfig::builder()
            .poll_interval(Duration::from_millis(10))
            .batch_size(2)
            .build()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_are_released_and_redelivered_never_acked() {
        let (dispatcher, key) = setup(3).await;
        let handler = Arc::new(SpyHandler::failing(&[2]));
        let runtime = Arc::new(
            ConsumerRuntime::builder()
                .dispatcher(dispatcher.clone())
                .group(key.clone())
                .consumer_id(ConsumerId::new("worker-1"))
                .handler(handler.clone())
                .config(fast_config())
                .build(),
        );

        let handle = runtime.start().unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if handler.attempts(2).len() >= 3 && handle.stats().processed == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        // 失败条目从未被确认，且每次重投次数递增
        let attempts = handler.attempts(2);
        assert!(attempts.len() >= 3);
        assert!(attempts.windows(2).all(|w| w[1] > w[0]));
        let pending = dispatcher.pending();
        assert!(pending.get(&key, EntryId::new(2)).await.unwrap().is_some());
        assert!(pending.get(&key, EntryId::new(1)).await.unwrap().is_none());
        assert!(pending.get(&key, EntryId::new(3)).await.unwrap().is_none());

        handle.shutdown();
        let mut states = handle.state_changes();
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(s) = states.next().await {
                if s == RuntimeState::Stopped {
                    break;
                }
            }
        })
        .await;
        assert_eq!(handle.state(), RuntimeState::Stopped);

        let stats = handle.stats();
        assert_eq!(stats.processed, 2);
        assert!(stats.failed >= 3);
        handle.join().await;

        // 关闭时交还并注销
        let left = pending.get(&key, EntryId::new(2)).await.unwrap().unwrap();
        assert!(left.is_released());
        assert!(
            dispatcher
                .registry()
                .live_consumers(&key)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn without_release_entries_wait_for_the_timeout() {
        let (dispatcher, key) = setup(1).await;
        let handler = Arc::new(SpyHandler::failing(&[1]));
        let config = RuntimeConfig::builder()
            .poll_interval(Duration::from_millis(10))
            .release_on_failure(false)
            .release_on_shutdown(false)
            .build();
        let runtime = Arc::new(
            ConsumerRuntime::builder()
                .dispatcher(dispatcher.clone())
                .group(key.clone())
                .handler(handler.clone())
                .config(config)
                .build(),
        );
        let consumer = runtime.consumer_id().clone();

        let handle = runtime.start().unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while handler.attempts(1).is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        // 给后续几轮拉取留出时间：租约未到期，不会重投
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown();
        handle.join().await;

        assert_eq!(handler.attempts(1), vec![1]);
        let pending = dispatcher
            .pending()
            .get(&key, EntryId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.owner(), &consumer);
        assert!(!pending.is_released());
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected_at_start() {
        let (dispatcher, key) = setup(1).await;
        let config = RuntimeConfig::builder().batch_size(0).build();
        let runtime = Arc::new(
            ConsumerRuntime::builder()
                .dispatcher(dispatcher.clone())
                .group(key.clone())
                .handler(Arc::new(SpyHandler::default()))
                .config(config)
                .build(),
        );

        let err = runtime.start().err().unwrap();
        assert!(matches!(err, StreamError::InvalidArgument { .. }));
        // 未启动：没有消费者被注册，也没有条目被认领
        assert!(
            dispatcher
                .registry()
                .live_consumers(&key)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(dispatcher.pending().count(&key).await.unwrap(), 0);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
        let zero_interval = RuntimeConfig::builder()
            .poll_interval(Duration::ZERO)
            .build();
        assert!(zero_interval.validate().is_err());
    }
}
