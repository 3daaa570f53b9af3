//! 条目处理器（EntryHandler）
//!
use crate::entry::Delivery;
use async_trait::async_trait;

/// 条目处理器：处理一次投递，返回错误即视为处理失败（不会被确认）
#[async_trait]
pub trait EntryHandler: Send + Sync {
    /// 处理器名称（用于日志与失败归因）
    fn handler_name(&self) -> &str;
    /// 处理一次投递；`delivery.delivery_count()` 可用于实现毒消息策略
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()>;
}
