//! 仿真核心模块
//!
//! 事件驱动仿真的核心组件：仿真时间、事件、世界和仿真器。
//! RLC 实体只用到其中的 SimTime；其余部分驱动测试与命令行工具。

mod event;
mod simulator;
mod time;
mod world;

pub use event::Event;
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;
