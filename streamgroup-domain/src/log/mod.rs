//! 日志原语（log）
//!
//! 持久、有序、按流名划分的只追加日志边界：
//! - `StreamLog`：追加、区间读取、按位点读取、尾部位点与长度；
//! - `InMemoryStreamLog`：内存实现，支持注入“暂时不可用”故障以便测试重试语义。
//!
mod log_inmemory;
mod stream_log;

pub use log_inmemory::InMemoryStreamLog;
pub use stream_log::StreamLog;
