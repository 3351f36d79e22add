//! 世界 trait
//!
//! 定义仿真世界接口。

use super::simulator::Simulator;
use std::any::Any;

/// 仿真世界：由业务层实现（例如无线链路两端的 RLC 实体）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// 每个事件执行完后调用；用于把实体内部产生的定时器请求交给调度器。
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
