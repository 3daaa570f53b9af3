//! 内存版只追加日志（InMemoryStreamLog）
//!
//! 基于 `DashMap` 按流分片的轻量实现，满足 `StreamLog` 协议：
//! - `append`：在流的分片锁内分配下一个位点，追加原子；
//! - `read_range`/`fetch`：二分定位，按位点有序返回；
//! - `delete`：模拟显式截断（对应 XDEL）；
//! - `set_unavailable`：注入“暂时不可用”，所有调用返回 `LogUnavailable`。
//!
use crate::clock::{Clock, system_clock};
use crate::entry::Entry;
use crate::error::{StreamError, StreamResult};
use crate::log::StreamLog;
use crate::value_object::{EntryId, StreamName};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct StreamState {
    entries: Vec<Entry>,
    /// 曾经分配过的最大位点（截断不回收）
    last_id: EntryId,
}

pub struct InMemoryStreamLog {
    streams: DashMap<StreamName, StreamState>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl Default for InMemoryStreamLog {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl InMemoryStreamLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            streams: DashMap::new(),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// 故障注入：为 true 时所有操作返回 `LogUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 显式截断单条（条目丢失的唯一途径）
    pub fn delete(&self, stream: &StreamName, id: EntryId) -> bool {
        let Some(mut state) = self.streams.get_mut(stream) else {
            return false;
        };
        match state.entries.binary_search_by_key(&id, Entry::id) {
            Ok(idx) => {
                state.entries.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    fn ensure_available(&self) -> StreamResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StreamError::log_unavailable("in-memory log switched off"));
        }
        Ok(())
    }
}

#[async_trait]
impl StreamLog for InMemoryStreamLog {
    async fn append(&self, stream: &StreamName, payload: Bytes) -> StreamResult<EntryId> {
        self.ensure_available()?;

        let mut state = self.streams.entry(stream.clone()).or_default();
        let id = state.last_id.next();
        state.entries.push(Entry::new(id, payload, self.clock.now()));
        state.last_id = id;
        Ok(id)
    }

    async fn read_range(
        &self,
        stream: &StreamName,
        from_exclusive: EntryId,
        max_count: usize,
    ) -> StreamResult<Vec<Entry>> {
        self.ensure_available()?;

        let Some(state) = self.streams.get(stream) else {
            return Ok(Vec::new());
        };
        let start = state.entries.partition_point(|e| e.id() <= from_exclusive);
        Ok(state.entries[start..]
            .iter()
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn fetch(&self, stream: &StreamName, id: EntryId) -> StreamResult<Option<Entry>> {
        self.ensure_available()?;

        Ok(self.streams.get(stream).and_then(|state| {
            state
                .entries
                .binary_search_by_key(&id, Entry::id)
                .ok()
                .map(|idx| state.entries[idx].clone())
        }))
    }

    async fn tail(&self, stream: &StreamName) -> StreamResult<EntryId> {
        self.ensure_available()?;

        Ok(self
            .streams
            .get(stream)
            .map(|state| state.last_id)
            .unwrap_or(EntryId::ZERO))
    }

    async fn len(&self, stream: &StreamName) -> StreamResult<u64> {
        self.ensure_available()?;

        Ok(self
            .streams
            .get(stream)
            .map(|state| state.entries.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamName {
        StreamName::new("s")
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let log = InMemoryStreamLog::default();
        let a = log.append(&stream(), Bytes::from_static(b"a")).await.unwrap();
        let b = log.append(&stream(), Bytes::from_static(b"b")).await.unwrap();
        assert_eq!(a, EntryId::new(1));
        assert_eq!(b, EntryId::new(2));
        assert_eq!(log.tail(&stream()).await.unwrap(), b);
        assert_eq!(log.len(&stream()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn read_range_is_exclusive_and_bounded() {
        let log = InMemoryStreamLog::default();
        let payloads = (0..5).map(|i| Bytes::from(format!("p{i}"))).collect();
        log.append_batch(&stream(), payloads).await.unwrap();

        let got = log.read_range(&stream(), EntryId::new(1), 2).await.unwrap();
        let ids: Vec<u64> = got.iter().map(|e| e.id().value()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(got[0].payload(), &Bytes::from("p1"));

        assert!(log.read_range(&stream(), EntryId::new(5), 10).await.unwrap().is_empty());
        assert!(
            log.read_range(&StreamName::new("missing"), EntryId::ZERO, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn delete_keeps_ids_monotonic() {
        let log = InMemoryStreamLog::default();
        log.append(&stream(), Bytes::from_static(b"a")).await.unwrap();
        log.append(&stream(), Bytes::from_static(b"b")).await.unwrap();

        assert!(log.delete(&stream(), EntryId::new(1)));
        assert!(log.delete(&stream(), EntryId::new(2)));
        assert!(!log.delete(&stream(), EntryId::new(2)));
        assert!(log.fetch(&stream(), EntryId::new(1)).await.unwrap().is_none());
        assert_eq!(log.len(&stream()).await.unwrap(), 0);

        let next = log.append(&stream(), Bytes::from_static(b"c")).await.unwrap();
        assert_eq!(next, EntryId::new(3));
    }

    #[tokio::test]
    async fn unavailable_log_fails_transiently() {
        let log = InMemoryStreamLog::default();
        log.set_unavailable(true);
        let err = log.tail(&stream()).await.unwrap_err();
        assert!(err.is_transient());

        log.set_unavailable(false);
        assert_eq!(log.tail(&stream()).await.unwrap(), EntryId::ZERO);
    }
}
