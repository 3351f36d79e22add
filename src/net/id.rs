//! 标识符类型
//!
//! 无线链路两端的 RLC 实体编号。

use serde::Serialize;

/// 链路端点（一个 RLC AM 实体）标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EndpointId(pub usize);
