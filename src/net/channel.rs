//! 无线信道
//!
//! 单向信道：固定时延，加上按计数确定性注入的丢包与 HARQ 失败。
//! 确定性注入让测试结果可复现。

use bytes::Bytes;
use serde::Serialize;

use super::id::EndpointId;
use crate::rlc::header::is_data_pdu;
use crate::sim::SimTime;

/// 信道对一个 PDU 的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFate {
    /// 在给定时刻到达对端
    Deliver(SimTime),
    /// 静默丢失
    Drop,
    /// 丢失，并在给定时刻向发送方反馈 HARQ 失败
    HarqFailure(SimTime),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelStats {
    pub offered: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub harq_failures: u64,
    pub bytes_delivered: u64,
}

#[derive(Debug)]
pub struct Channel {
    pub from: EndpointId,
    pub to: EndpointId,
    pub latency: SimTime,
    /// 每第 N 个（受影响的）PDU 丢失
    pub drop_every: Option<u64>,
    /// 每第 N 个（受影响的）PDU 触发 HARQ 失败
    pub harq_fail_every: Option<u64>,
    /// 只对数据 PDU 注入故障，STATUS PDU 总能到达
    pub data_only: bool,
    affected: u64,
    pub stats: ChannelStats,
}

impl Channel {
    pub fn new(from: EndpointId, to: EndpointId, latency: SimTime) -> Self {
        Self {
            from,
            to,
            latency,
            drop_every: None,
            harq_fail_every: None,
            data_only: true,
            affected: 0,
            stats: ChannelStats::default(),
        }
    }

    pub fn with_drop_every(mut self, n: u64) -> Self {
        self.drop_every = (n > 0).then_some(n);
        self
    }

    pub fn with_harq_fail_every(mut self, n: u64) -> Self {
        self.harq_fail_every = (n > 0).then_some(n);
        self
    }

    pub fn with_data_only(mut self, data_only: bool) -> Self {
        self.data_only = data_only;
        self
    }

    /// 决定 `pdu` 在 `now` 发出后的命运
    pub fn transmit(&mut self, pdu: &Bytes, now: SimTime) -> ChannelFate {
        self.stats.offered += 1;
        let exposed = !self.data_only || pdu.first().is_some_and(|&b| is_data_pdu(b));
        let arrive = now.saturating_add(self.latency);
        if exposed {
            self.affected += 1;
            if self.harq_fail_every.is_some_and(|n| self.affected % n == 0) {
                self.stats.harq_failures += 1;
                return ChannelFate::HarqFailure(arrive);
            }
            if self.drop_every.is_some_and(|n| self.affected % n == 0) {
                self.stats.dropped += 1;
                return ChannelFate::Drop;
            }
        }
        self.stats.delivered += 1;
        self.stats.bytes_delivered += pdu.len() as u64;
        ChannelFate::Deliver(arrive)
    }
}
