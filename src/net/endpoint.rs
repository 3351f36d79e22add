//! 链路端点
//!
//! 一个端点 = 一个 RLC AM 实体 + 一个记录上层可见事件的 `EndpointLog`。
//! 上层提交的 SDU 前面加一个 PDCP 头，接收方据此检查顺序与重复。

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use tracing::warn;

use super::id::EndpointId;
use crate::error::RlcError;
use crate::pdcp::{PDCP_SN_MASK, PdcpHeader};
use crate::rlc::{BufferStatus, MacSapProvider, RlcAm, RlcAmConfig, RlcSapUser, SequenceNumber};
use crate::sim::SimTime;

/// 端点上层 / MAC 观察到的事件
#[derive(Debug, Default)]
pub struct EndpointLog {
    pub delivered: Vec<Bytes>,
    pub max_retx: Vec<SequenceNumber>,
    pub last_buffer_status: BufferStatus,
    pub buffer_reports: u64,
}

impl EndpointLog {
    /// 已交付 SDU 的 PDCP 序号（按交付顺序）
    pub fn delivered_pdcp_sns(&self) -> Vec<u16> {
        self.delivered
            .iter()
            .filter_map(|sdu| PdcpHeader::decode(sdu).ok().map(|h| h.sn()))
            .collect()
    }
}

/// 把 RLC 的 SAP 回调写进共享日志
#[derive(Debug, Clone, Default)]
pub struct LogSap(pub Rc<RefCell<EndpointLog>>);

impl RlcSapUser for LogSap {
    fn receive_pdcp_pdu(&mut self, sdu: Bytes) {
        self.0.borrow_mut().delivered.push(sdu);
    }

    fn notify_max_retx_reached(&mut self, sn: SequenceNumber) {
        self.0.borrow_mut().max_retx.push(sn);
    }
}

impl MacSapProvider for LogSap {
    fn report_buffer_status(&mut self, status: BufferStatus) {
        let mut log = self.0.borrow_mut();
        log.last_buffer_status = status;
        log.buffer_reports += 1;
    }
}

pub struct Endpoint {
    id: EndpointId,
    name: String,
    pub rlc: RlcAm,
    log: Rc<RefCell<EndpointLog>>,
    next_pdcp_sn: u16,
    next_harq_id: u8,
    pub rejected_sdus: u64,
}

impl Endpoint {
    pub const HARQ_PROCESSES: u8 = 8;

    pub fn new(id: EndpointId, name: impl Into<String>, config: RlcAmConfig) -> Result<Self, RlcError> {
        let log = Rc::new(RefCell::new(EndpointLog::default()));
        let rlc = RlcAm::with_saps(
            config,
            Box::new(LogSap(Rc::clone(&log))),
            Box::new(LogSap(Rc::clone(&log))),
        )?;
        Ok(Self {
            id,
            name: name.into(),
            rlc,
            log,
            next_pdcp_sn: 0,
            next_harq_id: 0,
            rejected_sdus: 0,
        })
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self) -> std::cell::Ref<'_, EndpointLog> {
        self.log.borrow()
    }

    /// 加 PDCP 头后提交给 RLC；被拒绝时返回错误，序号不前进。
    pub fn submit(&mut self, payload: &[u8], now: SimTime) -> Result<u16, RlcError> {
        let sn = self.next_pdcp_sn;
        let sdu = PdcpHeader::new(true, sn).encode_pdu(payload);
        if let Err(e) = self.rlc.transmit_pdcp_pdu(sdu, now) {
            self.rejected_sdus += 1;
            warn!(endpoint = %self.name, pdcp_sn = sn, error = %e, "SDU rejected");
            return Err(e);
        }
        self.next_pdcp_sn = (sn + 1) & PDCP_SN_MASK;
        Ok(sn)
    }

    /// 轮转使用 HARQ 进程号
    pub(crate) fn next_harq_id(&mut self) -> u8 {
        let id = self.next_harq_id;
        self.next_harq_id = (id + 1) % Self::HARQ_PROCESSES;
        id
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rlc", &self.rlc)
            .finish_non_exhaustive()
    }
}
