//! 链路世界实现
//!
//! 持有无线链路；每个事件之后把实体产生的定时器请求交给调度器。

use super::radio_link::RadioLink;
use crate::sim::{Simulator, World};
use std::any::Any;

#[derive(Default)]
pub struct NetWorld {
    pub link: RadioLink,
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, sim: &mut Simulator) {
        self.link.drain_timer_requests(sim);
    }
}
