//! 消息处理器：解析 → 校验 → 处理 → 记录
//!
//! 任何一步失败都作为处理错误返回，条目保持待确认（由运行时释放或等待超时）。
//!
use crate::message::{MESSAGE_ID_KEY, Message, PROCESSED_STREAM};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use streamgroup_domain::entry::Delivery;
use streamgroup_domain::log::StreamLog;
use streamgroup_domain::retry::{RetryPolicy, retry};
use streamgroup_domain::runtime::EntryHandler;
use streamgroup_domain::value_object::{ConsumerId, StreamName};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("could not parse payload as JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("could not find expected key {0}")]
    MissingKey(&'static str),
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
}

pub struct MessageIdJsonHandler {
    log: Arc<dyn StreamLog>,
    consumer_id: ConsumerId,
    processed: StreamName,
    retry: RetryPolicy,
}

impl MessageIdJsonHandler {
    pub fn new(log: Arc<dyn StreamLog>, consumer_id: ConsumerId) -> Self {
        Self {
            log,
            consumer_id,
            processed: StreamName::new(PROCESSED_STREAM),
            retry: RetryPolicy::default(),
        }
    }

    fn parse(payload: &[u8]) -> Result<Value, MessageError> {
        serde_json::from_slice(payload).map_err(MessageError::Parse)
    }

    fn validate(message: &Value) -> Result<(), MessageError> {
        if message.get(MESSAGE_ID_KEY).is_none() {
            return Err(MessageError::MissingKey(MESSAGE_ID_KEY));
        }
        debug!(message_id = %message[MESSAGE_ID_KEY], "Validating message");
        Ok(())
    }

    fn process(&self, message: Value) -> Result<Message, MessageError> {
        let message: Message = serde_json::from_value(message).map_err(MessageError::Malformed)?;
        debug!(
            message_id = %message.message_id,
            consumer = %self.consumer_id,
            "Processing message"
        );
        Ok(message.processed_by(&self.consumer_id))
    }

    async fn record(&self, message: &Message) -> anyhow::Result<()> {
        let payload = Bytes::from(serde_json::to_vec(message)?);
        let id = retry(&self.retry, "append", move || {
            self.log.append(&self.processed, payload.clone())
        })
        .await?;
        debug!(
            message_id = %message.message_id,
            stream = %self.processed,
            entry_id = %id,
            "Recorded message"
        );
        Ok(())
    }
}

#[async_trait]
impl EntryHandler for MessageIdJsonHandler {
    fn handler_name(&self) -> &str {
        "message-id-json"
    }

    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let message = Self::parse(delivery.entry().payload())?;
        Self::validate(&message)?;
        let processed = self.process(message)?;
        self.record(&processed).await
    }
}
