//! 消费组与消费者数据模型
//!
//! - `GroupKey`：(流, 组名) 二元组，每对只对应一个消费组；
//! - `ConsumerGroup`：游标 `last_delivered_id` 只由分发器单调推进；
//! - `Consumer`：首次拉取时注册、空闲超时后被清理的临时身份。
//!
use crate::value_object::{ConsumerId, EntryId, GroupName, StartPosition, StreamName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    stream: StreamName,
    name: GroupName,
}

impl GroupKey {
    pub fn new(stream: impl Into<StreamName>, name: impl Into<GroupName>) -> Self {
        Self {
            stream: stream.into(),
            name: name.into(),
        }
    }

    pub fn stream(&self) -> &StreamName {
        &self.stream
    }

    pub fn name(&self) -> &GroupName {
        &self.name
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroup {
    key: GroupKey,
    /// 创建时请求的起始位置
    start: StartPosition,
    /// 起始位置解析出的初始游标
    start_id: EntryId,
    /// 已分发的最后位点，单调不减且不超过日志尾部
    last_delivered_id: EntryId,
    created_at: DateTime<Utc>,
}

impl ConsumerGroup {
    pub fn new(
        key: GroupKey,
        start: StartPosition,
        start_id: EntryId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            start,
            start_id,
            last_delivered_id: start_id,
            created_at,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn start(&self) -> StartPosition {
        self.start
    }

    pub fn start_id(&self) -> EntryId {
        self.start_id
    }

    /// 严格模式下的冲突判断：解析后的初始游标不同即冲突。
    /// 两次都请求 `Tail` 时视为相同，尾部在两次请求之间可能已经移动。
    pub fn conflicts_with(&self, start: StartPosition, start_id: EntryId) -> bool {
        if self.start == StartPosition::Tail && start == StartPosition::Tail {
            return false;
        }
        self.start_id != start_id
    }

    pub fn last_delivered_id(&self) -> EntryId {
        self.last_delivered_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 比较并推进游标：仅当当前值等于 `expected` 且 `to` 不回退时生效
    pub(crate) fn compare_and_advance(&mut self, expected: EntryId, to: EntryId) -> bool {
        if self.last_delivered_id != expected || to < expected {
            return false;
        }
        self.last_delivered_id = to;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    id: ConsumerId,
    group: GroupKey,
    last_seen_at: DateTime<Utc>,
}

impl Consumer {
    pub fn new(id: ConsumerId, group: GroupKey, last_seen_at: DateTime<Utc>) -> Self {
        Self {
            id,
            group,
            last_seen_at,
        }
    }

    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        // 时钟回拨时保持单调
        if now > self.last_seen_at {
            self.last_seen_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_only_advances_from_observed_value() {
        let mut g = ConsumerGroup::new(
            GroupKey::new("s", "g"),
            StartPosition::Beginning,
            EntryId::ZERO,
            Utc::now(),
        );

        assert!(g.compare_and_advance(EntryId::ZERO, EntryId::new(2)));
        assert_eq!(g.last_delivered_id(), EntryId::new(2));

        // 基于过期观测值的推进失败
        assert!(!g.compare_and_advance(EntryId::ZERO, EntryId::new(3)));
        // 不允许回退
        assert!(!g.compare_and_advance(EntryId::new(2), EntryId::new(1)));
        assert_eq!(g.last_delivered_id(), EntryId::new(2));
    }

    #[test]
    fn conflicts_compare_resolved_start_ids() {
        let key = GroupKey::new("s", "g");
        let beginning = ConsumerGroup::new(
            key.clone(),
            StartPosition::Beginning,
            EntryId::ZERO,
            Utc::now(),
        );
        assert!(!beginning.conflicts_with(StartPosition::After(EntryId::ZERO), EntryId::ZERO));
        assert!(beginning.conflicts_with(StartPosition::After(EntryId::new(2)), EntryId::new(2)));

        let tail = ConsumerGroup::new(key, StartPosition::Tail, EntryId::new(3), Utc::now());
        assert!(!tail.conflicts_with(StartPosition::Tail, EntryId::new(7)));
        assert!(!tail.conflicts_with(StartPosition::After(EntryId::new(3)), EntryId::new(3)));
        assert!(tail.conflicts_with(StartPosition::Beginning, EntryId::ZERO));
    }

    #[test]
    fn group_key_display() {
        assert_eq!(GroupKey::new("orders", "billing").to_string(), "orders/billing");
    }
}
