//! 消费者运行时（runtime）
//!
//! 每个消费者一个长驻任务，状态机为
//! `Idle → Polling → Processing → (Acking | Abandoning) → Idle`，关闭后进入 `Stopped`：
//! - `EntryHandler`：业务处理逻辑；
//! - `ConsumerRuntime`：拉取、并发处理、确认或放弃，并周期清理空闲消费者；
//! - `RuntimeHandle`：关闭、等待与状态观察。
//!
//! 处理失败只会进入 `Abandoning`，绝不自动确认：条目保持待确认，直到被释放或超时回收。
//!
pub mod engine;
pub mod handler;
pub mod state;

pub use engine::{ConsumerRuntime, RuntimeConfig, RuntimeHandle};
pub use handler::EntryHandler;
pub use state::{RuntimeState, RuntimeStats, RuntimeStatsSnapshot};
