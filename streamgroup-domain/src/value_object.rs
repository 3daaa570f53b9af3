//! 值对象与标识（Value Object / Identifier）
//!
//! 流、消费组、消费者的标识包装，以及条目位点 `EntryId`、
//! 消费组起始位置 `StartPosition` 与创建模式 `CreateMode`。
//!

use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;
use streamgroup_macros::{stream_id, value_object};
use uuid::Uuid;

/// 流名称（只追加日志的键）
#[stream_id]
pub struct StreamName(String);

/// 消费组名称（同一流内唯一）
#[stream_id]
pub struct GroupName(String);

/// 消费者标识（组内存活期间唯一）
#[stream_id]
pub struct ConsumerId(String);

impl ConsumerId {
    /// 生成随机消费者标识（UUID v4）
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// 条目位点
///
/// 由日志原语在追加时分配，严格单调递增；`EntryId::ZERO` 表示“第一条之前”。
///
/// # 示例
///
/// ```
/// use streamgroup_domain::value_object::EntryId;
///
/// let first = EntryId::ZERO.next();
/// assert_eq!(first.value(), 1);
/// assert!(first > EntryId::ZERO);
/// assert_eq!("42".parse::<EntryId>().unwrap(), EntryId::new(42));
/// ```
// 使用 value_object 宏提供基础的派生，手动添加位点特有的派生（Copy, PartialOrd, Ord, Hash）
#[value_object]
#[derive(Copy, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId {
    pub const ZERO: EntryId = EntryId(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 两个位点之间的距离（`self - earlier`，不足时为 0）
    pub fn distance_from(&self, earlier: EntryId) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<u64> for EntryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<EntryId> for u64 {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

/// 消费组的起始位置
#[value_object]
#[derive(Copy)]
pub enum StartPosition {
    /// 从流的第一条开始
    #[default]
    Beginning,
    /// 只消费创建之后追加的条目
    Tail,
    /// 从指定位点之后开始
    After(EntryId),
}

/// 消费组创建模式
#[value_object]
#[derive(Copy)]
pub enum CreateMode {
    /// 幂等：已存在时直接返回现有消费组
    #[default]
    IfNotExists,
    /// 严格：已存在且起始位置不同则报错
    Strict,
}
