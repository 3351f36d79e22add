//! 无线链路
//!
//! 持有若干 RLC 端点和它们之间的单向信道，负责把 MAC 发送机会、PDU 到达、
//! HARQ 反馈和 RLC 定时器到期转成对实体的调用。

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::channel::{Channel, ChannelFate};
use super::endpoint::Endpoint;
use super::events::{DeliverPdu, HarqFeedback, RlcTimerExpiry};
use super::id::EndpointId;
use crate::error::RlcError;
use crate::rlc::{RlcAmConfig, RlcStats, TimerKind};
use crate::sim::{SimTime, Simulator};

/// 链路级统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStats {
    pub opportunities: u64,
    pub pdus_sent: u64,
    pub bytes_sent: u64,
    pub malformed: u64,
    pub stale_timer_fires: u64,
}

#[derive(Default)]
pub struct RadioLink {
    endpoints: Vec<Endpoint>,
    channels: HashMap<(EndpointId, EndpointId), Channel>,
    pub stats: LinkStats,
}

impl RadioLink {
    /// 添加一个端点
    pub fn add_endpoint(
        &mut self,
        name: impl Into<String>,
        config: RlcAmConfig,
    ) -> Result<EndpointId, RlcError> {
        let id = EndpointId(self.endpoints.len());
        self.endpoints.push(Endpoint::new(id, name, config)?);
        Ok(id)
    }

    /// 连接两个端点（创建单向信道）
    pub fn connect(&mut self, channel: Channel) {
        self.channels.insert((channel.from, channel.to), channel);
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id.0)
    }

    pub fn endpoint_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(id.0)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn channel(&self, from: EndpointId, to: EndpointId) -> Option<&Channel> {
        self.channels.get(&(from, to))
    }

    pub fn rlc_stats(&self, id: EndpointId) -> Option<&RlcStats> {
        self.endpoint(id).map(|ep| ep.rlc.stats())
    }

    /// 对端：第一个有 from -> to 信道的端点
    fn peer_of(&self, from: EndpointId) -> Option<EndpointId> {
        let mut peers: Vec<EndpointId> = self
            .channels
            .keys()
            .filter(|(f, _)| *f == from)
            .map(|&(_, t)| t)
            .collect();
        peers.sort();
        peers.first().copied()
    }

    /// MAC 给 `from` 一次 `bytes` 字节的发送机会
    #[tracing::instrument(skip(self, sim), fields(now = ?sim.now()))]
    pub fn on_tx_opportunity(&mut self, from: EndpointId, bytes: usize, sim: &mut Simulator) {
        self.stats.opportunities += 1;
        let now = sim.now();
        let Some(ep) = self.endpoints.get_mut(from.0) else {
            warn!(?from, "unknown endpoint");
            return;
        };
        let harq_id = ep.next_harq_id();
        let Some(pdu) = ep.rlc.notify_tx_opportunity(bytes, harq_id, now) else {
            return;
        };
        self.stats.pdus_sent += 1;
        self.stats.bytes_sent += pdu.len() as u64;

        let Some(to) = self.peer_of(from) else {
            warn!(?from, "no channel out of endpoint, PDU lost");
            return;
        };
        let Some(channel) = self.channels.get_mut(&(from, to)) else {
            return;
        };
        match channel.transmit(&pdu, now) {
            ChannelFate::Deliver(at) => {
                trace!(?to, len = pdu.len(), ?at, "调度 PDU 到达");
                sim.schedule(at, DeliverPdu { to, pdu });
            }
            ChannelFate::Drop => debug!(?from, ?to, len = pdu.len(), "信道丢弃 PDU"),
            ChannelFate::HarqFailure(at) => {
                debug!(?from, harq_id, "HARQ 失败");
                sim.schedule(at, HarqFeedback { endpoint: from, harq_id });
            }
        }
    }

    /// PDU 到达端点 `to`
    pub fn deliver(&mut self, to: EndpointId, pdu: Bytes, sim: &mut Simulator) {
        let Some(ep) = self.endpoints.get_mut(to.0) else {
            return;
        };
        if let Err(e) = ep.rlc.receive_pdu(pdu, sim.now()) {
            self.stats.malformed += 1;
            warn!(?to, error = %e, "PDU rejected by RLC");
        }
    }

    pub fn on_harq_failure(&mut self, endpoint: EndpointId, harq_id: u8, sim: &mut Simulator) {
        if let Some(ep) = self.endpoints.get_mut(endpoint.0) {
            ep.rlc.notify_harq_delivery_failure(harq_id, sim.now());
        }
    }

    pub fn on_timer(
        &mut self,
        endpoint: EndpointId,
        kind: TimerKind,
        generation: u64,
        sim: &mut Simulator,
    ) {
        let Some(ep) = self.endpoints.get_mut(endpoint.0) else {
            return;
        };
        if !ep.rlc.expire_timer(kind, generation, sim.now()) {
            self.stats.stale_timer_fires += 1;
            trace!(?endpoint, ?kind, generation, "过期的定时器触发，忽略");
        }
    }

    /// 上层在端点 `endpoint` 提交一个 SDU
    pub fn submit(&mut self, endpoint: EndpointId, payload: &[u8], now: SimTime) -> Result<u16, RlcError> {
        match self.endpoints.get_mut(endpoint.0) {
            Some(ep) => ep.submit(payload, now),
            None => Err(RlcError::InvalidConfig(format!("unknown endpoint {}", endpoint.0))),
        }
    }

    /// 把所有实体新产生的定时器请求交给调度器
    pub fn drain_timer_requests(&mut self, sim: &mut Simulator) {
        for ep in &mut self.endpoints {
            for req in ep.rlc.take_timer_requests() {
                trace!(endpoint = ?ep.id(), kind = ?req.kind, at = ?req.at, "调度 RLC 定时器");
                sim.schedule(
                    req.at,
                    RlcTimerExpiry {
                        endpoint: ep.id(),
                        kind: req.kind,
                        generation: req.generation,
                    },
                );
            }
        }
    }
}
