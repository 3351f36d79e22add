//! 链路事件
//!
//! 每个事件都从 `NetWorld` 里取出 `RadioLink` 再调用对应的处理函数。

use bytes::Bytes;
use tracing::{debug, warn};

use super::id::EndpointId;
use super::net_world::NetWorld;
use super::radio_link::RadioLink;
use crate::rlc::TimerKind;
use crate::sim::{Event, SimTime, Simulator, World};

fn radio_link(world: &mut dyn World) -> Option<&mut RadioLink> {
    let link = world.as_any_mut().downcast_mut::<NetWorld>().map(|w| &mut w.link);
    if link.is_none() {
        warn!("world is not a NetWorld, event dropped");
    }
    link
}

/// 事件：MAC 给端点一次发送机会；`period` 非零时在 `until` 之前周期性重复。
#[derive(Debug, Clone)]
pub struct TxOpportunity {
    pub endpoint: EndpointId,
    pub bytes: usize,
    pub period: SimTime,
    pub until: SimTime,
}

impl Event for TxOpportunity {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Some(link) = radio_link(world) else {
            return;
        };
        link.on_tx_opportunity(self.endpoint, self.bytes, sim);
        if !self.period.is_zero() {
            let next = sim.now().saturating_add(self.period);
            if next <= self.until {
                sim.schedule(next, *self);
            }
        }
    }
}

/// 事件：PDU 到达端点
#[derive(Debug)]
pub struct DeliverPdu {
    pub to: EndpointId,
    pub pdu: Bytes,
}

impl Event for DeliverPdu {
    #[tracing::instrument(skip(self, sim, world), fields(to = ?self.to, len = self.pdu.len()))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPdu { to, pdu } = *self;
        if let Some(link) = radio_link(world) {
            link.deliver(to, pdu, sim);
        }
    }
}

/// 事件：RLC 定时器到期（代数不匹配时实体自行忽略）
#[derive(Debug, Clone, Copy)]
pub struct RlcTimerExpiry {
    pub endpoint: EndpointId,
    pub kind: TimerKind,
    pub generation: u64,
}

impl Event for RlcTimerExpiry {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        if let Some(link) = radio_link(world) {
            link.on_timer(self.endpoint, self.kind, self.generation, sim);
        }
    }
}

/// 事件：HARQ 进程报告投递失败
#[derive(Debug, Clone, Copy)]
pub struct HarqFeedback {
    pub endpoint: EndpointId,
    pub harq_id: u8,
}

impl Event for HarqFeedback {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        if let Some(link) = radio_link(world) {
            link.on_harq_failure(self.endpoint, self.harq_id, sim);
        }
    }
}

/// 事件：上层在端点提交一个 SDU（负载内容由调用方给定）
#[derive(Debug)]
pub struct SubmitSdu {
    pub endpoint: EndpointId,
    pub payload: Bytes,
}

impl Event for SubmitSdu {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let SubmitSdu { endpoint, payload } = *self;
        if let Some(link) = radio_link(world) {
            match link.submit(endpoint, &payload, sim.now()) {
                Ok(pdcp_sn) => debug!(?endpoint, pdcp_sn, len = payload.len(), "SDU 已提交"),
                Err(e) => debug!(?endpoint, error = %e, "SDU 提交失败"),
            }
        }
    }
}
