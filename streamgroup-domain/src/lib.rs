//! 消费组协调引擎（streamgroup-domain）
//!
//! 在只追加日志之上实现“消费组”语义：多个独立消费者协作分摊同一条流的条目，
//! 保证至少一次处理，并回收崩溃或停滞消费者遗留的条目。
//!
//! - 日志原语（`log`）与消费组簿记原语（`store`）：引擎唯一的共享可变资源，
//!   所有正确性建立在其原子操作之上；
//! - 消费组注册表（`registry`）：消费组创建、消费者注册与空闲清理；
//! - 待确认条目表（`pending`）：已投递未确认的条目及其租约式所有权；
//! - 分发器（`dispatcher`）：回答“这个消费者接下来处理什么”，并保证排他；
//! - 回收器（`reclaimer`）：把超时条目以乐观转移的方式交给新属主；
//! - 消费者运行时（`runtime`）：拉取、处理、确认或放弃的长驻任务；
//! - 监控（`monitor`）：待确认数、滞后量与最老待确认条目的时长。
//!
//! 典型用法：
//! 1. 选择 `StreamLog` 与 `GroupStore` 的实现（内置内存版）；
//! 2. 通过 `Dispatcher::builder()` 组装分发器并创建消费组；
//! 3. 实现 `EntryHandler`，用 `ConsumerRuntime` 启动一组消费者。
//!
pub mod clock;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod group;
pub mod log;
pub mod monitor;
pub mod pending;
pub mod reclaimer;
pub mod registry;
pub mod retry;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod store;
pub mod value_object;
