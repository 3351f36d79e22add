//! 演示和示例代码
//!
//! 搭建一条两端点的无线链路，并调度一次批量 SDU 传输。命令行工具和集成测试共用。

use bytes::Bytes;

use crate::error::RlcError;
use crate::net::{Channel, EndpointId, NetWorld, SubmitSdu, TxOpportunity};
use crate::rlc::RlcAmConfig;
use crate::sim::{SimTime, Simulator};

/// 链路与流量配置
#[derive(Debug, Clone)]
pub struct LinkOpts {
    pub sdu_bytes: usize,
    pub sdus: u64,
    /// 两个 SDU 提交间隔
    pub gap: SimTime,
    /// 发送方每个 TTI 的发送机会大小
    pub opportunity_bytes: usize,
    /// 接收方（回送 STATUS）每个 TTI 的发送机会大小
    pub reverse_opportunity_bytes: usize,
    pub tti: SimTime,
    /// 单向传播时延
    pub latency: SimTime,
    /// 数据方向每第 N 个数据 PDU 丢失，0 表示不丢
    pub drop_every: u64,
    /// 数据方向每第 N 个数据 PDU 触发 HARQ 失败，0 表示不触发
    pub harq_fail_every: u64,
    pub until: SimTime,
}

impl Default for LinkOpts {
    fn default() -> Self {
        Self {
            sdu_bytes: 300,
            sdus: 200,
            gap: SimTime::from_micros(1000),
            opportunity_bytes: 600,
            reverse_opportunity_bytes: 200,
            tti: SimTime::from_millis(1),
            latency: SimTime::from_millis(2),
            drop_every: 0,
            harq_fail_every: 0,
            until: SimTime::from_secs(2),
        }
    }
}

/// 构建链路：ue -> enb 为数据方向，enb -> ue 回送 STATUS。
/// 返回：(发送端, 接收端)
pub fn build_radio_link(
    world: &mut NetWorld,
    opts: &LinkOpts,
    config: &RlcAmConfig,
) -> Result<(EndpointId, EndpointId), RlcError> {
    let ue = world.link.add_endpoint("ue", config.clone())?;
    let enb = world.link.add_endpoint("enb", config.clone())?;

    world.link.connect(
        Channel::new(ue, enb, opts.latency)
            .with_drop_every(opts.drop_every)
            .with_harq_fail_every(opts.harq_fail_every),
    );
    world.link.connect(Channel::new(enb, ue, opts.latency));
    Ok((ue, enb))
}

/// 第 `index` 个 SDU 的负载：可辨认的确定性字节模式
pub fn sdu_payload(index: u64, len: usize) -> Bytes {
    (0..len)
        .map(|i| (index as usize).wrapping_mul(31).wrapping_add(i) as u8)
        .collect::<Vec<u8>>()
        .into()
}

/// 在 `tx` 上按 `gap` 提交 `sdus` 个 SDU，并为两端调度周期性发送机会。
pub fn schedule_bulk_transfer(sim: &mut Simulator, opts: &LinkOpts, tx: EndpointId, rx: EndpointId) {
    for i in 0..opts.sdus {
        let at = SimTime(opts.gap.0.saturating_mul(i));
        sim.schedule(
            at,
            SubmitSdu {
                endpoint: tx,
                payload: sdu_payload(i, opts.sdu_bytes),
            },
        );
    }
    // 发送机会落在 TTI 中点，避开与 SDU 提交同一时刻
    let first = SimTime(opts.tti.0 / 2);
    sim.schedule(
        first,
        TxOpportunity {
            endpoint: tx,
            bytes: opts.opportunity_bytes,
            period: opts.tti,
            until: opts.until,
        },
    );
    sim.schedule(
        first,
        TxOpportunity {
            endpoint: rx,
            bytes: opts.reverse_opportunity_bytes,
            period: opts.tti,
            until: opts.until,
        },
    );
}
