//! ARQ 发送侧
//!
//! 已发 PDU 记录、VT(A)/VT(S) 发送窗口，以及待重传 PDU 的（重）分段。
//!
//! 记录放在按 SN 索引的 1024 槽表中：从首次发送起占用，直到被确认，
//! 或重传 `max_retx_threshold` 次后放弃。重传计数按 PDU 进行：
//! 只有 NACK 带来尚未排队的新字节时计数才加一，同一空洞被重复报告只算一次。

use std::collections::BTreeMap;
use std::ops::Range;

use bytes::Bytes;
use serde::Serialize;

use super::header::{AMD_SEGMENT_HEADER_LEN, AmdHeader, AmdPdu, FramingInfo, SegmentInfo};
use super::sn::{SN_MODULUS, SequenceNumber};
use super::status::{SO_END_OF_PDU, StatusPdu};
use crate::sim::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PduState {
    /// 已发送，等待 STATUS
    Sent,
    /// 被 NACK（或 HARQ 失败），尚未重发任何部分
    RetxPending,
    /// 部分待重传字节已重发，其余仍在排队
    Retransmitting,
}

#[derive(Debug, Clone)]
pub(crate) struct TxRecord {
    pub(crate) sn: SequenceNumber,
    pub(crate) framing: FramingInfo,
    /// 数据域中各 SDU 片段的长度（按顺序）
    pub(crate) piece_lens: Vec<usize>,
    pub(crate) payload: Bytes,
    pub(crate) sdu_ids: Vec<u64>,
    pub(crate) retx_count: u32,
    pub(crate) state: PduState,
    pub(crate) sent_at: SimTime,
    pending: Vec<Range<usize>>,
}

impl TxRecord {
    pub(crate) fn new(
        sn: SequenceNumber,
        framing: FramingInfo,
        piece_lens: Vec<usize>,
        payload: Bytes,
        sdu_ids: Vec<u64>,
        now: SimTime,
    ) -> Self {
        Self {
            sn,
            framing,
            piece_lens,
            payload,
            sdu_ids,
            retx_count: 0,
            state: PduState::Sent,
            sent_at: now,
            pending: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.payload.len()
    }

    fn length_indicators(&self) -> Vec<u16> {
        let n = self.piece_lens.len().saturating_sub(1);
        self.piece_lens[..n].iter().map(|&l| l as u16).collect()
    }

    /// 数据域内部（不含两端）的 SDU 边界偏移
    fn interior_boundaries(&self) -> Vec<usize> {
        let n = self.piece_lens.len().saturating_sub(1);
        self.piece_lens[..n]
            .iter()
            .scan(0usize, |acc, &l| {
                *acc += l;
                Some(*acc)
            })
            .collect()
    }

    /// 覆盖数据域 `range` 的分段的 FI 与 LI
    pub(crate) fn framing_for(&self, range: &Range<usize>) -> (FramingInfo, Vec<u16>) {
        let interior = self.interior_boundaries();
        let starts = if range.start == 0 {
            self.framing.starts_sdu()
        } else {
            interior.contains(&range.start)
        };
        let ends = if range.end == self.len() {
            self.framing.ends_sdu()
        } else {
            interior.contains(&range.end)
        };
        let mut lis = Vec::new();
        let mut prev = range.start;
        for &c in interior.iter().filter(|&&c| c > range.start && c < range.end) {
            lis.push((c - prev) as u16);
            prev = c;
        }
        (FramingInfo::new(starts, ends), lis)
    }

    /// 把 `range` 并入待重传集合，返回新增字节数
    fn add_pending(&mut self, range: Range<usize>) -> usize {
        let start = range.start.min(self.len());
        let end = range.end.min(self.len());
        if start >= end {
            return 0;
        }
        let covered: usize = self
            .pending
            .iter()
            .map(|r| r.end.min(end).saturating_sub(r.start.max(start)))
            .sum();
        self.pending.push(start..end);
        self.pending.sort_by_key(|r| r.start);
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(self.pending.len());
        for r in self.pending.drain(..) {
            if let Some(last) = merged.last_mut() {
                if r.start <= last.end {
                    last.end = last.end.max(r.end);
                    continue;
                }
            }
            merged.push(r);
        }
        self.pending = merged;
        (end - start) - covered
    }
}

/// 请求重传一个 PDU 的结果
#[derive(Debug)]
pub(crate) enum RetxMark {
    Queued,
    /// 请求的字节都已在排队
    AlreadyPending,
    /// 计数将超过门限；记录已移除
    Escalated(TxRecord),
    /// 该 SN 没有记录（已确认、已放弃或从未发送）
    Unknown,
}

#[derive(Debug, Default)]
pub(crate) struct StatusOutcome {
    pub(crate) valid: bool,
    pub(crate) acked: Vec<TxRecord>,
    pub(crate) escalated: Vec<TxRecord>,
    pub(crate) queued: u32,
    pub(crate) poll_answered: bool,
}

/// 可以直接发出的重传
#[derive(Debug)]
pub(crate) struct RetxPdu {
    pub(crate) pdu: AmdPdu,
    pub(crate) range: Range<usize>,
}

#[derive(Debug)]
pub(crate) struct TxWindow {
    records: Vec<Option<TxRecord>>,
    window_size: u16,
    vt_a: SequenceNumber,
    vt_s: SequenceNumber,
    poll_sn: SequenceNumber,
}

impl TxWindow {
    pub(crate) fn new(window_size: u16) -> Self {
        Self {
            records: vec![None; SN_MODULUS as usize],
            window_size,
            vt_a: SequenceNumber::ZERO,
            vt_s: SequenceNumber::ZERO,
            poll_sn: SequenceNumber::ZERO,
        }
    }

    pub(crate) fn vt_a(&self) -> SequenceNumber {
        self.vt_a
    }

    pub(crate) fn vt_s(&self) -> SequenceNumber {
        self.vt_s
    }

    pub(crate) fn vt_ms(&self) -> SequenceNumber {
        self.vt_a + self.window_size
    }

    pub(crate) fn poll_sn(&self) -> SequenceNumber {
        self.poll_sn
    }

    pub(crate) fn set_poll_sn(&mut self, sn: SequenceNumber) {
        self.poll_sn = sn;
    }

    /// [VT(A), VT(S)) 中的 SN 个数
    pub(crate) fn outstanding(&self) -> u16 {
        self.vt_s.offset_from(self.vt_a)
    }

    /// 还能分配新 SN：VT(S) != VT(MS)
    pub(crate) fn can_assign(&self) -> bool {
        self.outstanding() < self.window_size
    }

    fn is_outstanding(&self, sn: SequenceNumber) -> bool {
        sn.offset_from(self.vt_a) < self.outstanding()
    }

    pub(crate) fn record(&self, sn: SequenceNumber) -> Option<&TxRecord> {
        if !self.is_outstanding(sn) {
            return None;
        }
        self.records[sn.index()].as_ref()
    }

    fn outstanding_records(&self) -> impl Iterator<Item = &TxRecord> {
        (0..self.outstanding()).filter_map(move |off| self.records[(self.vt_a + off).index()].as_ref())
    }

    /// 在 VT(S) 处保存新组的 PDU，并推进 VT(S)
    pub(crate) fn push(&mut self, record: TxRecord) {
        debug_assert_eq!(record.sn, self.vt_s);
        debug_assert!(self.can_assign());
        self.records[self.vt_s.index()] = Some(record);
        self.vt_s = self.vt_s.next();
    }

    pub(crate) fn lowest_unacked(&self) -> Option<SequenceNumber> {
        self.outstanding_records().next().map(|r| r.sn)
    }

    pub(crate) fn has_pending_retx(&self) -> bool {
        self.outstanding_records().any(|r| !r.pending.is_empty())
    }

    /// 待重传字节数，每个区间按一个分段头估算
    pub(crate) fn retx_queue_bytes(&self) -> usize {
        self.outstanding_records()
            .flat_map(|r| r.pending.iter())
            .map(|range| range.len() + AMD_SEGMENT_HEADER_LEN)
            .sum()
    }

    pub(crate) fn retx_hol_delay(&self, now: SimTime) -> SimTime {
        self.outstanding_records()
            .find(|r| !r.pending.is_empty())
            .map_or(SimTime::ZERO, |r| now.saturating_sub(r.sent_at))
    }

    fn advance_vt_a(&mut self) {
        while self.vt_a != self.vt_s && self.records[self.vt_a.index()].is_none() {
            self.vt_a = self.vt_a.next();
        }
    }

    /// 把 PDU `sn` 的 `ranges` 排入重传；发生上报后由调用方用
    /// [`TxWindow::settle`] 推进 VT(A)
    pub(crate) fn mark_for_retx(
        &mut self,
        sn: SequenceNumber,
        ranges: &[Range<usize>],
        max_retx: u32,
    ) -> RetxMark {
        if !self.is_outstanding(sn) {
            return RetxMark::Unknown;
        }
        let slot = &mut self.records[sn.index()];
        let Some(rec) = slot.as_mut() else {
            return RetxMark::Unknown;
        };
        let added: usize = ranges.iter().map(|r| rec.add_pending(r.clone())).sum();
        if added == 0 {
            return RetxMark::AlreadyPending;
        }
        if rec.retx_count >= max_retx {
            return match slot.take() {
                Some(rec) => RetxMark::Escalated(rec),
                None => RetxMark::Unknown,
            };
        }
        rec.retx_count += 1;
        rec.state = PduState::RetxPending;
        RetxMark::Queued
    }

    /// 在 STATUS 之外移除记录后重新确定 VT(A)
    pub(crate) fn settle(&mut self) {
        self.advance_vt_a();
    }

    /// 应用 STATUS PDU：[VT(A), ACK_SN) 中未被 NACK 的全部确认
    pub(crate) fn apply_status(&mut self, status: &StatusPdu, max_retx: u32) -> StatusOutcome {
        let ack_off = status.ack_sn.offset_from(self.vt_a);
        if ack_off > self.outstanding() {
            return StatusOutcome::default();
        }

        let mut nacked: BTreeMap<u16, Vec<Range<usize>>> = BTreeMap::new();
        for nack in &status.nacks {
            let off = nack.sn.offset_from(self.vt_a);
            if off >= ack_off {
                continue;
            }
            let Some(len) = self.records[nack.sn.index()].as_ref().map(TxRecord::len) else {
                continue;
            };
            let range = match nack.range {
                None => 0..len,
                Some((start, end)) if end == SO_END_OF_PDU => start as usize..len,
                Some((start, end)) => start as usize..(end as usize + 1),
            };
            nacked.entry(off).or_default().push(range);
        }

        let mut out = StatusOutcome {
            valid: true,
            poll_answered: self.poll_sn.offset_from(self.vt_a) < ack_off,
            ..StatusOutcome::default()
        };
        let base = self.vt_a;
        for off in 0..ack_off {
            let sn = base + off;
            match nacked.get(&off) {
                Some(ranges) => match self.mark_for_retx(sn, ranges, max_retx) {
                    RetxMark::Queued => out.queued += 1,
                    RetxMark::Escalated(rec) => out.escalated.push(rec),
                    RetxMark::AlreadyPending | RetxMark::Unknown => {}
                },
                None => {
                    if let Some(rec) = self.records[sn.index()].take() {
                        out.acked.push(rec);
                    }
                }
            }
        }
        self.advance_vt_a();
        out
    }

    /// 构造能放进 `max_bytes` 的下一个重传，SN 小的优先
    pub(crate) fn take_retx(&mut self, max_bytes: usize) -> Option<RetxPdu> {
        let base = self.vt_a;
        let sn = (0..self.outstanding()).map(|off| base + off).find(|sn| {
            self.records[sn.index()]
                .as_ref()
                .is_some_and(|r| !r.pending.is_empty())
        })?;
        let rec = self.records[sn.index()].as_mut()?;
        let range = rec.pending.first()?.clone();

        if range.start == 0 && range.end == rec.len() {
            let lis = rec.length_indicators();
            if AmdHeader::len_for(false, lis.len()) + rec.len() <= max_bytes {
                rec.pending.remove(0);
                rec.state = if rec.pending.is_empty() {
                    PduState::Sent
                } else {
                    PduState::Retransmitting
                };
                let pdu = AmdPdu {
                    header: AmdHeader {
                        sn,
                        poll: false,
                        framing: rec.framing,
                        segment: None,
                        length_indicators: lis,
                    },
                    payload: rec.payload.clone(),
                };
                return Some(RetxPdu { pdu, range });
            }
        }

        let mut end = range
            .end
            .min(range.start + max_bytes.saturating_sub(AMD_SEGMENT_HEADER_LEN));
        let (framing, lis) = loop {
            if end <= range.start {
                return None;
            }
            let (framing, lis) = rec.framing_for(&(range.start..end));
            let hlen = AmdHeader::len_for(true, lis.len());
            if hlen + (end - range.start) <= max_bytes {
                break (framing, lis);
            }
            end = range.start + max_bytes.saturating_sub(hlen).min(end - range.start - 1);
        };

        let seg = range.start..end;
        if let Some(first) = rec.pending.first_mut() {
            first.start = end;
            if first.is_empty() {
                rec.pending.remove(0);
            }
        }
        rec.state = if rec.pending.is_empty() {
            PduState::Sent
        } else {
            PduState::Retransmitting
        };
        let pdu = AmdPdu {
            header: AmdHeader {
                sn,
                poll: false,
                framing,
                segment: Some(SegmentInfo {
                    offset: seg.start as u16,
                    last: seg.end == rec.len(),
                }),
                length_indicators: lis,
            },
            payload: rec.payload.slice(seg.clone()),
        };
        Some(RetxPdu { pdu, range: seg })
    }

    /// 丢弃全部记录，并返回它们以便释放对应 SDU
    pub(crate) fn clear(&mut self) -> Vec<TxRecord> {
        let drained: Vec<TxRecord> = self.records.iter_mut().filter_map(Option::take).collect();
        self.vt_a = self.vt_s;
        drained
    }
}
