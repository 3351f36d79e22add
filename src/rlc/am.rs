//! RLC AM 实体
//!
//! 发送侧、接收侧与定时器，对外只通过两个 SAP。每个入口都一次执行完：
//! 待发 PDU 由 [`RlcAm::notify_tx_opportunity`] 同步返回；交付的 SDU、
//! 最大重传上报和缓冲状态报告经 [`RlcAm::with_saps`] 传入的 SAP 对象送出。
//! 定时器在内部启动，以 [`TimerRequest`] 的形式交给驱动方调度。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use super::config::RlcAmConfig;
use super::forwarding::InFlightSdus;
use super::header::{
    AMD_FIXED_HEADER_LEN, AmdHeader, AmdPdu, FramingInfo, MAX_LI, MAX_PDU_PAYLOAD, is_data_pdu,
};
use super::retx::{PduState, RetxMark, RetxPdu, TxRecord, TxWindow};
use super::rx::Receiver;
use super::sap::{BufferStatus, MacSapProvider, MacSapUser, NullMacSap, NullSapUser, RlcSapProvider, RlcSapUser};
use super::sn::SequenceNumber;
use super::stats::RlcStats;
use super::status::StatusPdu;
use super::timer::{TimerKind, TimerRequest, TimerTable};
use super::tx_buffer::{SduPiece, TxBuffer};
use crate::error::{CodecError, RlcError};
use crate::sim::SimTime;

pub struct RlcAm {
    config: RlcAmConfig,
    upper: Box<dyn RlcSapUser>,
    mac: Box<dyn MacSapProvider>,
    tx_buffer: TxBuffer,
    window: TxWindow,
    rx: Receiver,
    timers: TimerTable,
    in_flight: InFlightSdus,
    /// HARQ 进程 -> 上一次在该进程上发出的数据
    harq: HashMap<u8, Vec<(SequenceNumber, Range<usize>)>>,
    pdu_without_poll: u32,
    byte_without_poll: u64,
    /// 轮询重传定时器已到期：下一个数据 PDU 带 poll
    poll_pending: bool,
    stats: RlcStats,
    disposed: bool,
}

impl fmt::Debug for RlcAm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RlcAm")
            .field("vt_a", &self.window.vt_a())
            .field("vt_s", &self.window.vt_s())
            .field("vr_r", &self.rx.vr_r())
            .field("vr_h", &self.rx.vr_h())
            .field("tx_buffer", &self.tx_buffer.occupancy())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl RlcAm {
    /// 使用空 SAP 的实体
    pub fn new(config: RlcAmConfig) -> Result<Self, RlcError> {
        Self::with_saps(config, Box::new(NullSapUser), Box::new(NullMacSap))
    }

    pub fn with_saps(
        config: RlcAmConfig,
        upper: Box<dyn RlcSapUser>,
        mac: Box<dyn MacSapProvider>,
    ) -> Result<Self, RlcError> {
        config.validate()?;
        Ok(Self {
            tx_buffer: TxBuffer::new(config.max_tx_buffer_size, config.enable_aqm),
            window: TxWindow::new(config.window_size),
            rx: Receiver::new(config.window_size, config.reordering_timer),
            timers: TimerTable::default(),
            in_flight: InFlightSdus::default(),
            harq: HashMap::new(),
            pdu_without_poll: 0,
            byte_without_poll: 0,
            poll_pending: false,
            stats: RlcStats::default(),
            disposed: false,
            upper,
            mac,
            config,
        })
    }

    pub fn config(&self) -> &RlcAmConfig {
        &self.config
    }

    pub fn stats(&self) -> &RlcStats {
        &self.stats
    }

    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    pub fn vt_a(&self) -> SequenceNumber {
        self.window.vt_a()
    }

    pub fn vt_s(&self) -> SequenceNumber {
        self.window.vt_s()
    }

    pub fn vt_ms(&self) -> SequenceNumber {
        self.window.vt_ms()
    }

    pub fn poll_sn(&self) -> SequenceNumber {
        self.window.poll_sn()
    }

    pub fn vr_r(&self) -> SequenceNumber {
        self.rx.vr_r()
    }

    pub fn vr_mr(&self) -> SequenceNumber {
        self.rx.vr_mr()
    }

    pub fn vr_x(&self) -> SequenceNumber {
        self.rx.vr_x()
    }

    pub fn vr_ms(&self) -> SequenceNumber {
        self.rx.vr_ms()
    }

    pub fn vr_h(&self) -> SequenceNumber {
        self.rx.vr_h()
    }

    pub fn tx_buffer_occupancy(&self) -> usize {
        self.tx_buffer.occupancy()
    }

    /// 接收侧缓存的 SN 数（含不完整的）
    pub fn rx_buffered(&self) -> usize {
        self.rx.buffered()
    }

    pub fn status_pending(&self) -> bool {
        self.rx.status_requested()
    }

    pub fn retx_count(&self, sn: SequenceNumber) -> Option<u32> {
        self.window.record(sn).map(|r| r.retx_count)
    }

    pub fn pdu_state(&self, sn: SequenceNumber) -> Option<PduState> {
        self.window.record(sn).map(|r| r.state)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn take_timer_requests(&mut self) -> Vec<TimerRequest> {
        self.timers.take_requests()
    }

    /// 上层提交一个 SDU
    #[tracing::instrument(skip(self, sdu), fields(len = sdu.len()))]
    pub fn transmit_pdcp_pdu(&mut self, sdu: Bytes, now: SimTime) -> Result<(), RlcError> {
        if self.disposed {
            return Err(RlcError::Disposed);
        }
        if let Err(e) = self.tx_buffer.submit(sdu, now) {
            self.stats.tx_sdus_discarded += 1;
            warn!(error = %e, "SDU discarded");
            return Err(e);
        }
        self.stats.tx_sdus_accepted += 1;
        self.report_buffer_status(now);
        Ok(())
    }

    /// 填充一次 `bytes` 字节的发送机会：先 STATUS，再重传，最后新数据
    #[tracing::instrument(skip(self))]
    pub fn notify_tx_opportunity(&mut self, bytes: usize, harq_id: u8, now: SimTime) -> Option<Bytes> {
        if self.disposed {
            return None;
        }
        self.harq.remove(&harq_id);

        let status_due = self.rx.status_requested() && !self.timers.is_running(TimerKind::StatusProhibit);
        let out = if status_due && bytes >= StatusPdu::MIN_LEN {
            self.send_status(bytes, now)
        } else {
            self.send_retx(bytes, harq_id, now)
                .or_else(|| self.send_new_data(bytes, harq_id, now))
        };
        if out.is_none() {
            trace!(bytes, "opportunity unused");
        }
        self.report_buffer_status(now);
        out
    }

    fn send_status(&mut self, bytes: usize, now: SimTime) -> Option<Bytes> {
        let status = self.rx.build_status(bytes)?;
        let encoded = status.encode();
        self.stats.status_pdus_sent += 1;
        if !self.config.status_prohibit_timer.is_zero() {
            self.timers
                .restart(TimerKind::StatusProhibit, now, self.config.status_prohibit_timer);
        }
        debug!(ack_sn = %status.ack_sn, nacks = status.nacks.len(), len = encoded.len(), "STATUS sent");
        Some(encoded)
    }

    fn poll_needed(&self) -> bool {
        self.poll_pending
            || (self.tx_buffer.is_empty() && !self.window.has_pending_retx())
            || !self.window.can_assign()
    }

    fn set_poll(&mut self, header: &mut AmdHeader, now: SimTime) {
        header.poll = true;
        self.pdu_without_poll = 0;
        self.byte_without_poll = 0;
        self.poll_pending = false;
        self.window.set_poll_sn(self.window.vt_s().prev());
        self.timers
            .restart(TimerKind::PollRetransmit, now, self.config.poll_retransmit_timer);
        self.stats.polls_sent += 1;
    }

    fn send_retx(&mut self, bytes: usize, harq_id: u8, now: SimTime) -> Option<Bytes> {
        if !self.window.has_pending_retx() {
            return None;
        }
        let Some(RetxPdu { mut pdu, range }) = self.window.take_retx(bytes) else {
            self.stats.tiny_opportunities += 1;
            return None;
        };
        if self.poll_needed() {
            self.set_poll(&mut pdu.header, now);
        }
        let encoded = pdu.encode();
        self.stats.retx_pdus += 1;
        self.stats.retx_bytes += encoded.len() as u64;
        debug!(
            sn = %pdu.header.sn,
            so = range.start,
            len = range.len(),
            poll = pdu.header.poll,
            "retransmission"
        );
        self.harq.entry(harq_id).or_default().push((pdu.header.sn, range));
        Some(encoded)
    }

    fn send_new_data(&mut self, bytes: usize, harq_id: u8, now: SimTime) -> Option<Bytes> {
        if self.tx_buffer.is_empty() {
            return None;
        }
        if !self.window.can_assign() {
            self.stats.window_stalls += 1;
            debug!(vt_a = %self.window.vt_a(), vt_s = %self.window.vt_s(), "window stalled");
            return None;
        }
        if bytes <= AMD_FIXED_HEADER_LEN {
            self.stats.tiny_opportunities += 1;
            return None;
        }

        let mut pieces: Vec<SduPiece> = Vec::new();
        let mut payload_len = 0;
        loop {
            if let Some(last) = pieces.last() {
                if !last.ends_sdu || last.data.len() > MAX_LI {
                    break;
                }
            }
            let header_len = AmdHeader::len_for(false, pieces.len());
            if header_len + payload_len >= bytes || payload_len >= MAX_PDU_PAYLOAD {
                break;
            }
            let room = (bytes - header_len - payload_len).min(MAX_PDU_PAYLOAD - payload_len);
            let Some(piece) = self.tx_buffer.consume(room, now) else {
                break;
            };
            payload_len += piece.data.len();
            pieces.push(piece);
        }
        let dropped = self.tx_buffer.take_queue_drops();
        if dropped > 0 {
            self.stats.tx_sdus_aqm_dropped += dropped;
            debug!(dropped, "queue discipline dropped SDUs");
        }
        let (Some(first), Some(last)) = (pieces.first(), pieces.last()) else {
            return None;
        };

        let sn = self.window.vt_s();
        let framing = FramingInfo::new(first.starts_sdu, last.ends_sdu);
        let piece_lens: Vec<usize> = pieces.iter().map(|p| p.data.len()).collect();
        let length_indicators: Vec<u16> = piece_lens[..piece_lens.len() - 1]
            .iter()
            .map(|&l| l as u16)
            .collect();
        let payload = if pieces.len() == 1 {
            first.data.clone()
        } else {
            let mut buf = BytesMut::with_capacity(payload_len);
            for p in &pieces {
                buf.extend_from_slice(&p.data);
            }
            buf.freeze()
        };
        for p in &pieces {
            self.in_flight.add_pdu(p.sdu_id, &p.sdu, p.ends_sdu);
        }
        let sdu_ids = pieces.iter().map(|p| p.sdu_id).collect();

        self.window.push(TxRecord::new(
            sn,
            framing,
            piece_lens,
            payload.clone(),
            sdu_ids,
            now,
        ));
        self.pdu_without_poll += 1;
        self.byte_without_poll += payload.len() as u64;

        let mut pdu = AmdPdu {
            header: AmdHeader {
                sn,
                poll: false,
                framing,
                segment: None,
                length_indicators,
            },
            payload,
        };
        if self.poll_needed()
            || self.pdu_without_poll >= self.config.poll_pdu
            || self.byte_without_poll >= self.config.poll_byte
        {
            self.set_poll(&mut pdu.header, now);
        }
        let encoded = pdu.encode();
        self.stats.tx_pdus += 1;
        self.stats.tx_bytes += encoded.len() as u64;
        debug!(
            %sn,
            framing = ?framing,
            pieces = pdu.header.length_indicators.len() + 1,
            len = encoded.len(),
            poll = pdu.header.poll,
            "new AMD PDU"
        );
        self.harq
            .entry(harq_id)
            .or_default()
            .push((sn, 0..pdu.payload.len()));
        Some(encoded)
    }

    /// 收到对端的 PDU（数据或控制）
    #[tracing::instrument(skip(self, pdu), fields(len = pdu.len()))]
    pub fn receive_pdu(&mut self, pdu: Bytes, now: SimTime) -> Result<(), RlcError> {
        if self.disposed {
            return Err(RlcError::Disposed);
        }
        let Some(&first) = pdu.first() else {
            self.stats.rx_malformed += 1;
            return Err(CodecError::Truncated {
                needed: 1,
                available: 0,
            }
            .into());
        };
        self.stats.rx_pdus += 1;
        self.stats.rx_bytes += pdu.len() as u64;

        if is_data_pdu(first) {
            let amd = match AmdPdu::decode(pdu) {
                Ok(amd) => amd,
                Err(e) => {
                    self.stats.rx_malformed += 1;
                    warn!(error = %e, "malformed AMD PDU");
                    return Err(e.into());
                }
            };
            trace!(sn = %amd.header.sn, poll = amd.header.poll, "AMD PDU received");
            let delivered = self
                .rx
                .receive_data(amd, now, &mut self.timers, &mut self.stats);
            self.deliver(delivered);
            if self.rx.status_requested() {
                self.report_buffer_status(now);
            }
        } else {
            let status = match StatusPdu::decode(&pdu) {
                Ok(s) => s,
                Err(e) => {
                    self.stats.rx_malformed += 1;
                    warn!(error = %e, "malformed STATUS PDU");
                    return Err(e.into());
                }
            };
            self.on_status(status, now);
        }
        Ok(())
    }

    fn deliver(&mut self, sdus: Vec<Bytes>) {
        for sdu in sdus {
            self.upper.receive_pdcp_pdu(sdu);
        }
    }

    fn release(&mut self, record: &TxRecord) {
        for &id in &record.sdu_ids {
            self.in_flight.release_pdu(id);
        }
    }

    fn escalate(&mut self, record: TxRecord) {
        self.stats.max_retx_reached += 1;
        warn!(sn = %record.sn, retx = record.retx_count, "max retransmissions reached");
        self.release(&record);
        self.upper.notify_max_retx_reached(record.sn);
    }

    fn on_status(&mut self, status: StatusPdu, now: SimTime) {
        self.stats.status_pdus_received += 1;
        let outcome = self
            .window
            .apply_status(&status, self.config.max_retx_threshold);
        if !outcome.valid {
            warn!(
                ack_sn = %status.ack_sn,
                vt_a = %self.window.vt_a(),
                vt_s = %self.window.vt_s(),
                "STATUS acknowledges beyond VT(S), ignored"
            );
            return;
        }
        if outcome.poll_answered {
            self.timers.cancel(TimerKind::PollRetransmit);
        }
        debug!(
            ack_sn = %status.ack_sn,
            acked = outcome.acked.len(),
            nacked = outcome.queued,
            vt_a = %self.window.vt_a(),
            "STATUS applied"
        );
        for rec in &outcome.acked {
            self.release(rec);
        }
        for rec in outcome.escalated {
            self.escalate(rec);
        }
        self.report_buffer_status(now);
    }

    /// MAC 未能送达 `harq_id` 上发出的数据
    pub fn notify_harq_delivery_failure(&mut self, harq_id: u8, now: SimTime) {
        if self.disposed {
            return;
        }
        let Some(sent) = self.harq.remove(&harq_id) else {
            return;
        };
        self.stats.harq_failures += 1;
        for (sn, range) in sent {
            match self
                .window
                .mark_for_retx(sn, &[range], self.config.max_retx_threshold)
            {
                RetxMark::Queued => debug!(%sn, harq_id, "HARQ failure, queued for retransmission"),
                RetxMark::Escalated(rec) => self.escalate(rec),
                RetxMark::AlreadyPending | RetxMark::Unknown => {}
            }
        }
        self.window.settle();
        self.report_buffer_status(now);
    }

    /// 下行版本的 [`RlcAm::notify_harq_delivery_failure`]
    pub fn notify_dl_harq_delivery_failure(&mut self, harq_id: u8, now: SimTime) {
        self.notify_harq_delivery_failure(harq_id, now);
    }

    /// 处理一次定时器触发；过期的触发返回 `false`
    #[tracing::instrument(skip(self))]
    pub fn expire_timer(&mut self, kind: TimerKind, generation: u64, now: SimTime) -> bool {
        if self.disposed || !self.timers.fire(kind, generation) {
            return false;
        }
        match kind {
            TimerKind::PollRetransmit => self.on_poll_retransmit_expiry(now),
            TimerKind::Reordering => {
                let delivered = self
                    .rx
                    .on_reordering_expiry(now, &mut self.timers, &mut self.stats);
                debug!(vr_r = %self.rx.vr_r(), vr_h = %self.rx.vr_h(), "reordering timer expired");
                self.deliver(delivered);
                self.report_buffer_status(now);
            }
            TimerKind::StatusProhibit => {
                if self.rx.status_requested() {
                    self.report_buffer_status(now);
                }
            }
            TimerKind::Rbs => self.report_buffer_status(now),
        }
        true
    }

    fn on_poll_retransmit_expiry(&mut self, now: SimTime) {
        self.poll_pending = true;
        if self.tx_buffer.is_empty() || !self.window.can_assign() {
            let last = self.window.vt_s().prev();
            let mut target = self
                .window
                .record(last)
                .map(|r| r.sn)
                .or_else(|| self.window.lowest_unacked());
            while let Some(sn) = target {
                let Some(len) = self.window.record(sn).map(TxRecord::len) else {
                    break;
                };
                match self
                    .window
                    .mark_for_retx(sn, &[0..len], self.config.max_retx_threshold)
                {
                    RetxMark::Queued => {
                        debug!(%sn, "poll retransmit expired, PDU queued");
                        break;
                    }
                    RetxMark::Escalated(rec) => {
                        self.escalate(rec);
                        self.window.settle();
                        // 放弃后改由最老的未确认 PDU 携带轮询
                        target = self.window.lowest_unacked();
                    }
                    RetxMark::AlreadyPending | RetxMark::Unknown => break,
                }
            }
            if !self.window.has_pending_retx() && self.window.lowest_unacked().is_some() {
                self.timers
                    .restart(TimerKind::PollRetransmit, now, self.config.poll_retransmit_timer);
            }
        }
        self.report_buffer_status(now);
    }

    pub fn buffer_status(&self, now: SimTime) -> BufferStatus {
        let occupancy = self.tx_buffer.occupancy();
        BufferStatus {
            tx_queue_bytes: if occupancy > 0 {
                occupancy + AMD_FIXED_HEADER_LEN * self.tx_buffer.sdu_count()
            } else {
                0
            },
            tx_queue_hol_delay: self.tx_buffer.head_of_line_delay(now),
            retx_queue_bytes: self.window.retx_queue_bytes(),
            retx_queue_hol_delay: self.window.retx_hol_delay(now),
            status_pdu_bytes: self.rx.pending_status_len(),
        }
    }

    fn report_buffer_status(&mut self, now: SimTime) {
        let status = self.buffer_status(now);
        self.mac.report_buffer_status(status);
        if !status.is_empty() && !self.config.rbs_timer.is_zero() {
            self.timers.arm(TimerKind::Rbs, now, self.config.rbs_timer);
        }
    }

    /// 所有尚未完全确认的 SDU 副本，按提交顺序
    pub fn forwarding_sdus(&self) -> Vec<Bytes> {
        let mut sdus: BTreeMap<u64, Bytes> = self
            .in_flight
            .iter()
            .map(|(id, data)| (id, data.clone()))
            .collect();
        sdus.extend(self.tx_buffer.untouched_sdus());
        sdus.into_values().collect()
    }

    /// 先取消所有定时器，再清空缓冲；之后的调用都被拒绝
    pub fn dispose(&mut self) {
        self.timers.cancel_all();
        self.tx_buffer.clear();
        self.window.clear();
        self.rx.clear();
        self.in_flight.clear();
        self.harq.clear();
        self.disposed = true;
        debug!("entity disposed");
    }
}

impl RlcSapProvider for RlcAm {
    fn transmit_pdcp_pdu(&mut self, sdu: Bytes, now: SimTime) -> Result<(), RlcError> {
        RlcAm::transmit_pdcp_pdu(self, sdu, now)
    }
}

impl MacSapUser for RlcAm {
    fn notify_tx_opportunity(&mut self, bytes: usize, harq_id: u8, now: SimTime) -> Option<Bytes> {
        RlcAm::notify_tx_opportunity(self, bytes, harq_id, now)
    }

    fn receive_pdu(&mut self, pdu: Bytes, now: SimTime) -> Result<(), RlcError> {
        RlcAm::receive_pdu(self, pdu, now)
    }

    fn notify_harq_delivery_failure(&mut self, harq_id: u8, now: SimTime) {
        RlcAm::notify_harq_delivery_failure(self, harq_id, now)
    }
}
