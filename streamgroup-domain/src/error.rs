//! 消费组协调引擎统一错误定义
//!
//! 聚焦参数校验、所有权、消费组定义冲突与日志原语可用性等最小必要集合，
//! 便于在各实现层统一转换为 `StreamError`。
//!
use crate::group::GroupKey;
use crate::value_object::{ConsumerId, EntryId, StartPosition};
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StreamError {
    // --- 调用方输入 ---
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 消费组与待确认条目 ---
    #[error(
        "ownership mismatch: group={group}, entry_id={entry_id}, owner={owner}, actual_owner={actual_owner}"
    )]
    OwnershipMismatch {
        group: GroupKey,
        entry_id: EntryId,
        owner: ConsumerId,
        actual_owner: ConsumerId,
    },
    #[error("not found: {reason}")]
    NotFound { reason: String },
    #[error(
        "consumer group already exists: group={group}, existing_start={existing_start:?}, requested_start={requested_start:?}"
    )]
    AlreadyExists {
        group: GroupKey,
        existing_start: StartPosition,
        requested_start: StartPosition,
    },
    #[error("consumer group not found: {group}")]
    GroupNotFound { group: GroupKey },

    // --- 日志原语 ---
    #[error("log unavailable: {reason}")]
    LogUnavailable { reason: String },

    // --- 消费者运行时 ---
    #[error("entry handler error: handler={handler}, reason={reason}")]
    Handler { handler: String, reason: String },
}

impl StreamError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn log_unavailable(reason: impl Into<String>) -> Self {
        Self::LogUnavailable {
            reason: reason.into(),
        }
    }

    /// 包装处理器返回的错误（保留完整错误链）
    pub fn handler(handler: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: format!("{err:#}"),
        }
    }

    /// 仅日志原语的暂时不可用允许按退避策略重试
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LogUnavailable { .. })
    }
}

/// 统一 Result 类型别名
pub type StreamResult<T> = Result<T, StreamError>;

impl From<std::num::ParseIntError> for StreamError {
    fn from(err: std::num::ParseIntError) -> Self {
        StreamError::Parse {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_log_unavailability_is_transient() {
        assert!(StreamError::log_unavailable("down").is_transient());
        assert!(!StreamError::handler("spy", &anyhow::anyhow!("boom")).is_transient());
        assert!(!StreamError::invalid_argument("batch_size").is_transient());
        assert!(!StreamError::not_found("entry 1").is_transient());
    }

    #[test]
    fn ownership_mismatch_display_names_both_owners() {
        let err = StreamError::OwnershipMismatch {
            group: GroupKey::new("orders", "billing"),
            entry_id: EntryId::new(7),
            owner: ConsumerId::new("a"),
            actual_owner: ConsumerId::new("b"),
        };
        let text = err.to_string();
        assert!(text.contains("orders/billing"));
        assert!(text.contains("entry_id=7"));
        assert!(text.contains("owner=a"));
        assert!(text.contains("actual_owner=b"));
    }

    #[test]
    fn handler_error_keeps_the_context_chain() {
        let err = anyhow::anyhow!("missing key").context("validate message");
        let wrapped = StreamError::handler("message-id-json", &err);
        assert_eq!(
            wrapped.to_string(),
            "entry handler error: handler=message-id-json, reason=validate message: missing key"
        );
    }

    #[test]
    fn malformed_entry_id_is_a_parse_error() {
        let err = "x".parse::<EntryId>().unwrap_err();
        assert!(matches!(err, StreamError::Parse { .. }));
    }
}
