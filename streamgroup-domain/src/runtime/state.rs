//! 运行时状态与计数
//!
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use streamgroup_macros::value_object;

#[value_object]
#[derive(Copy, Hash)]
pub enum RuntimeState {
    #[default]
    Idle,
    Polling,
    Processing,
    Acking,
    Abandoning,
    Stopped,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Processing => "processing",
            Self::Acking => "acking",
            Self::Abandoning => "abandoning",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
pub struct RuntimeStats {
    pub(crate) delivered: AtomicU64,
    pub(crate) processed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) released: AtomicU64,
    pub(crate) stale_acks: AtomicU64,
}

impl RuntimeStats {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RuntimeStatsSnapshot {
        RuntimeStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            stale_acks: self.stale_acks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStatsSnapshot {
    /// 拉取到的投递数（含回收）
    pub delivered: u64,
    /// 处理成功并确认
    pub processed: u64,
    /// 处理失败
    pub failed: u64,
    /// 主动释放（失败或关闭时）
    pub released: u64,
    /// 确认时已失去所有权
    pub stale_acks: u64,
}
