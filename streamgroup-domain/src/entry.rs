//! 条目模型（Entry）
//!
//! 追加后不可变；由日志原语持有，引擎只通过廉价克隆（`Bytes` 引用计数）引用。
//!
use crate::value_object::EntryId;
use bytes::Bytes;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// 日志分配的位点
    id: EntryId,
    /// 不透明负载，格式由生产者决定
    payload: Bytes,
    /// 追加时间
    produced_at: DateTime<Utc>,
}

impl Entry {
    pub fn new(id: EntryId, payload: Bytes, produced_at: DateTime<Utc>) -> Self {
        Self {
            id,
            payload,
            produced_at,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }
}

/// 一次投递：条目及其在消费组内的投递元信息
///
/// `delivery_count` 暴露给调用方，用于自行实现毒消息策略；引擎本身不会丢弃条目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    entry: Entry,
    delivery_count: u32,
    reclaimed: bool,
}

impl Delivery {
    pub fn new(entry: Entry, delivery_count: u32, reclaimed: bool) -> Self {
        Self {
            entry,
            delivery_count,
            reclaimed,
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn id(&self) -> EntryId {
        self.entry.id()
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// 是否为超时回收后的重新投递
    pub fn is_reclaimed(&self) -> bool {
        self.reclaimed
    }
}
