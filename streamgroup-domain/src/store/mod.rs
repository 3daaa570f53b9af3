//! 消费组簿记原语（store）
//!
//! 日志原语之外的“按组投递簿记”：消费组游标、成员、待确认条目。
//! - `GroupStore`：每个方法都是一次可线性化的原子操作（比较并推进、比较并转移所有权）；
//! - `InMemoryGroupStore`：基于 `DashMap` 的内存实现，每个消费组的分片锁即线性化点。
//!
mod group_store;
mod store_inmemory;

pub use group_store::GroupStore;
pub use store_inmemory::InMemoryGroupStore;
