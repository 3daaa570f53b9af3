//! 演示流水线中的消息格式
//!
use serde::{Deserialize, Serialize};
use streamgroup_domain::value_object::ConsumerId;
use uuid::Uuid;

/// 生产者写入的流
pub const PUBLISHED_STREAM: &str = "messages:published";
/// 处理结果写入的流
pub const PROCESSED_STREAM: &str = "messages:processed";
/// 处理消息的消费组
pub const GROUP_NAME: &str = "message-processors";

pub const MESSAGE_ID_KEY: &str = "message_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_result: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_consumer_id: Option<ConsumerId>,
}

impl Message {
    /// 新发布的消息，仅携带 `message_id`
    pub fn published() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            processing_result: None,
            processing_consumer_id: None,
        }
    }

    /// 附上处理结果与处理者
    pub fn processed_by(self, consumer: &ConsumerId) -> Self {
        Self {
            processing_result: Some(Uuid::new_v4()),
            processing_consumer_id: Some(consumer.clone()),
            ..self
        }
    }
}
