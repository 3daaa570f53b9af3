//! 只追加日志协议（StreamLog）
//!
//! 引擎把日志视为可信原语：追加原子且位点严格递增，区间读取按位点有序。
//!
use crate::entry::Entry;
use crate::error::StreamResult;
use crate::value_object::{EntryId, StreamName};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait StreamLog: Send + Sync {
    /// 追加一条负载，返回新分配的位点
    async fn append(&self, stream: &StreamName, payload: Bytes) -> StreamResult<EntryId>;

    /// 按顺序追加一批负载
    async fn append_batch(
        &self,
        stream: &StreamName,
        payloads: Vec<Bytes>,
    ) -> StreamResult<Vec<EntryId>> {
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            ids.push(self.append(stream, payload).await?);
        }
        Ok(ids)
    }

    /// 读取 `from_exclusive` 之后最多 `max_count` 条，按位点升序
    async fn read_range(
        &self,
        stream: &StreamName,
        from_exclusive: EntryId,
        max_count: usize,
    ) -> StreamResult<Vec<Entry>>;

    /// 按位点读取单条；条目被显式截断后返回 `None`
    async fn fetch(&self, stream: &StreamName, id: EntryId) -> StreamResult<Option<Entry>>;

    /// 当前尾部位点；空流为 `EntryId::ZERO`
    async fn tail(&self, stream: &StreamName) -> StreamResult<EntryId>;

    /// 当前条目数
    async fn len(&self, stream: &StreamName) -> StreamResult<u64>;
}

