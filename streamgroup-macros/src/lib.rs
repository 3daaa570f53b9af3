//! streamgroup 过程宏
//!
//! 为领域层的值类型与标识类型生成样板实现：
//! - `#[value_object]`：值对象（结构体或枚举）的标准派生集合；
//! - `#[stream_id]`：单字段 tuple struct 的标识包装（流名、消费组名、消费者 ID 等）。
//!
use proc_macro::TokenStream;

mod derive_utils;
mod stream_id;
mod value_object;

/// 值对象宏
/// - 支持结构体（具名或 tuple）与枚举
/// - 合并/追加派生：Default, Clone, (Debug 可控), Serialize, Deserialize, PartialEq, Eq
/// - 参数：`#[value_object(debug = true|false)]`，默认 true
#[proc_macro_attribute]
pub fn value_object(attr: TokenStream, item: TokenStream) -> TokenStream {
    value_object::expand(attr, item)
}

/// 标识宏
/// 用于 `struct ConsumerId(String);`、`struct StreamName(String);` 这类单字段 tuple struct：
/// - 合并/追加派生：Clone, (Debug 可控), Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord
/// - 序列化透明（`#[serde(transparent)]`）
/// - 提供 `new`、`Display`、`FromStr`、`AsRef`、`From` 等便捷实现
/// - 内部类型为 `String` 时额外提供 `as_str()` 与 `From<&str>`
#[proc_macro_attribute]
pub fn stream_id(attr: TokenStream, item: TokenStream) -> TokenStream {
    stream_id::expand(attr, item)
}
