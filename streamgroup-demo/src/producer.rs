//! 脚本化生产者
//!
//! 每轮向 `messages:published` 追加一批 `{"message_id": "<uuid>"}`，随后随机休眠 100-500ms；
//! 运行到指定时长或无限运行，直到被取消。
//!
use crate::message::Message;
use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use streamgroup_domain::error::StreamResult;
use streamgroup_domain::log::StreamLog;
use streamgroup_domain::retry::{RetryPolicy, retry};
use streamgroup_domain::value_object::StreamName;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct ProducerSettings {
    pub stream: StreamName,
    pub batch_size: usize,
    /// `None` 表示无限运行
    pub duration: Option<Duration>,
}

pub struct Producer {
    log: Arc<dyn StreamLog>,
    settings: ProducerSettings,
    retry: RetryPolicy,
}

impl Producer {
    pub fn new(log: Arc<dyn StreamLog>, settings: ProducerSettings) -> Self {
        Self {
            log,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    /// 运行生产循环，返回发布的消息总数
    pub async fn run(&self, token: CancellationToken) -> u64 {
        let started = Instant::now();
        let mut total: u64 = 0;

        while self.should_continue(started) && !token.is_cancelled() {
            let batch_size = self.settings.batch_size;
            info!(stream = %self.settings.stream, "Sending {} messages", batch_size);
            if let Err(e) = self.publish_batch().await {
                error!(stream = %self.settings.stream, error = %e, "Publishing failed");
                break;
            }
            total += batch_size as u64;

            let pause = Duration::from_millis(rand::thread_rng().gen_range(100..=500));
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
            info!(stream = %self.settings.stream, "Sent {} messages", batch_size);
        }

        info!(stream = %self.settings.stream, "Total messages published: {}", total);
        total
    }

    fn should_continue(&self, started: Instant) -> bool {
        match self.settings.duration {
            Some(duration) => started.elapsed() < duration,
            None => true,
        }
    }

    async fn publish_batch(&self) -> StreamResult<()> {
        let payloads = (0..self.settings.batch_size)
            .map(|_| serde_json::to_vec(&Message::published()).map(Bytes::from))
            .collect::<Result<Vec<_>, _>>()?;

        let log = &self.log;
        let stream = &self.settings.stream;
        retry(&self.retry, "append_batch", move || {
            log.append_batch(stream, payloads.clone())
        })
        .await?;
        Ok(())
    }
}
