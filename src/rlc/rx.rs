//! 接收侧
//!
//! VR(R)..VR(MR) 接收窗口、按字节的 PDU 重组、按 FI/LI 边界的 SDU 重组，
//! 以及 STATUS PDU 的构造。

use std::collections::{BTreeMap, BTreeSet};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use super::header::{AmdHeader, AmdPdu};
use super::sn::{SN_MODULUS, SequenceNumber};
use super::stats::RlcStats;
use super::status::{Nack, SO_END_OF_PDU, StatusPdu};
use super::timer::{TimerKind, TimerTable};
use crate::sim::SimTime;

/// 一个 SN 已收到的字节（可能来自多个分段）
#[derive(Debug, Default, Clone)]
pub(crate) struct RxEntry {
    /// 起始偏移 -> 数据；区间互不重叠
    segments: BTreeMap<usize, Bytes>,
    /// 数据域内的 SDU 边界偏移（数据域以 SDU 开始 / 结束时含 0 / total）
    boundaries: BTreeSet<usize>,
    /// 数据域长度，收到最后一个字节后才知道
    total: Option<usize>,
}

/// 完整收到的数据域，已按 SDU 边界切开
#[derive(Debug)]
pub(crate) struct RxPdu {
    pub(crate) pieces: Vec<Bytes>,
    pub(crate) starts_sdu: bool,
    pub(crate) ends_sdu: bool,
}

impl RxEntry {
    /// 存入 `payload` 中尚未持有的字节，返回新增字节数
    pub(crate) fn insert(&mut self, header: &AmdHeader, payload: Bytes) -> usize {
        let so = header.segment.map_or(0, |s| s.offset as usize);
        let end = so + payload.len();

        if header.framing.starts_sdu() {
            self.boundaries.insert(so);
        }
        if header.framing.ends_sdu() {
            self.boundaries.insert(end);
        }
        let mut acc = so;
        for &li in &header.length_indicators {
            acc += li as usize;
            self.boundaries.insert(acc);
        }
        if header.segment.is_none_or(|s| s.last) {
            self.total = Some(end);
        }

        let overlaps: Vec<(usize, usize)> = self
            .segments
            .range(..end)
            .map(|(&s, d)| (s, s + d.len()))
            .filter(|&(_, e)| e > so)
            .collect();
        let mut added = 0;
        let mut cursor = so;
        for (s, e) in overlaps {
            if s > cursor {
                self.segments.insert(cursor, payload.slice(cursor - so..s - so));
                added += s - cursor;
            }
            cursor = cursor.max(e);
        }
        if cursor < end {
            self.segments.insert(cursor, payload.slice(cursor - so..));
            added += end - cursor;
        }
        added
    }

    pub(crate) fn is_complete(&self) -> bool {
        let Some(total) = self.total else {
            return false;
        };
        let mut cursor = 0;
        for (&s, d) in &self.segments {
            if s > cursor {
                return false;
            }
            cursor = cursor.max(s + d.len());
        }
        cursor >= total
    }

    /// 空洞 `(start, end)`；数据域长度未知时 `end` 为 `None`
    pub(crate) fn missing_ranges(&self) -> Vec<(usize, Option<usize>)> {
        let mut gaps = Vec::new();
        let mut cursor = 0;
        for (&s, d) in &self.segments {
            if s > cursor {
                gaps.push((cursor, Some(s)));
            }
            cursor = cursor.max(s + d.len());
        }
        match self.total {
            Some(t) if cursor < t => gaps.push((cursor, Some(t))),
            None => gaps.push((cursor, None)),
            _ => {}
        }
        gaps
    }

    fn into_pdu(self) -> RxPdu {
        let total = self.total.unwrap_or(0);
        let data = if self.segments.len() == 1 {
            self.segments.into_values().next().unwrap_or_default()
        } else {
            let mut buf = BytesMut::with_capacity(total);
            for d in self.segments.into_values() {
                buf.extend_from_slice(&d);
            }
            buf.freeze()
        };
        let mut pieces = Vec::new();
        let mut prev = 0;
        for &b in self.boundaries.iter().filter(|&&b| b > 0 && b < total) {
            pieces.push(data.slice(prev..b));
            prev = b;
        }
        pieces.push(data.slice(prev..total));
        RxPdu {
            pieces,
            starts_sdu: self.boundaries.contains(&0),
            ends_sdu: self.boundaries.contains(&total),
        }
    }
}

#[derive(Debug, Default)]
enum Reassembly {
    #[default]
    Idle,
    Partial(BytesMut),
    /// 丢弃片段直到下一个 SDU 起点；被丢的 SDU 已计数
    Discarding,
}

/// 把连续完整 PDU 中的 SDU 片段拼回 SDU
#[derive(Debug, Default)]
pub(crate) struct SduReassembler {
    state: Reassembly,
}

impl SduReassembler {
    pub(crate) fn on_pdu(&mut self, pdu: RxPdu, out: &mut Vec<Bytes>, stats: &mut RlcStats) {
        let n = pdu.pieces.len();
        for (i, piece) in pdu.pieces.into_iter().enumerate() {
            let starts = i > 0 || pdu.starts_sdu;
            let ends = i + 1 < n || pdu.ends_sdu;

            if starts {
                if matches!(self.state, Reassembly::Partial(_)) {
                    stats.rx_sdus_discarded += 1;
                }
                if ends {
                    out.push(piece);
                    self.state = Reassembly::Idle;
                } else {
                    let mut buf = BytesMut::with_capacity(piece.len() * 2);
                    buf.extend_from_slice(&piece);
                    self.state = Reassembly::Partial(buf);
                }
                continue;
            }

            match std::mem::take(&mut self.state) {
                Reassembly::Partial(mut buf) => {
                    buf.extend_from_slice(&piece);
                    if ends {
                        out.push(buf.freeze());
                    } else {
                        self.state = Reassembly::Partial(buf);
                    }
                }
                Reassembly::Discarding => {
                    if !ends {
                        self.state = Reassembly::Discarding;
                    }
                }
                Reassembly::Idle => {
                    // 没有起点的续段
                    stats.rx_sdus_discarded += 1;
                    if !ends {
                        self.state = Reassembly::Discarding;
                    }
                }
            }
        }
    }

    /// 一个 PDU 的数据再也不会到达。
    ///
    /// 丢失的 PDU 里有几个 SDU 无从得知：每段连续丢失至少计一个 SDU，
    /// 所以 `rx_sdus_discarded` 是下界。
    pub(crate) fn on_loss(&mut self, stats: &mut RlcStats) {
        match self.state {
            Reassembly::Partial(_) | Reassembly::Idle => stats.rx_sdus_discarded += 1,
            Reassembly::Discarding => {}
        }
        self.state = Reassembly::Discarding;
    }
}

#[derive(Debug)]
pub(crate) struct Receiver {
    window_size: u16,
    reordering: SimTime,
    entries: Vec<Option<RxEntry>>,
    vr_r: SequenceNumber,
    vr_x: SequenceNumber,
    vr_ms: SequenceNumber,
    vr_h: SequenceNumber,
    reassembler: SduReassembler,
    status_requested: bool,
}

impl Receiver {
    pub(crate) fn new(window_size: u16, reordering: SimTime) -> Self {
        Self {
            window_size,
            reordering,
            entries: vec![None; SN_MODULUS as usize],
            vr_r: SequenceNumber::ZERO,
            vr_x: SequenceNumber::ZERO,
            vr_ms: SequenceNumber::ZERO,
            vr_h: SequenceNumber::ZERO,
            reassembler: SduReassembler::default(),
            status_requested: false,
        }
    }

    pub(crate) fn vr_r(&self) -> SequenceNumber {
        self.vr_r
    }

    pub(crate) fn vr_mr(&self) -> SequenceNumber {
        self.vr_r + self.window_size
    }

    pub(crate) fn vr_x(&self) -> SequenceNumber {
        self.vr_x
    }

    pub(crate) fn vr_ms(&self) -> SequenceNumber {
        self.vr_ms
    }

    pub(crate) fn vr_h(&self) -> SequenceNumber {
        self.vr_h
    }

    pub(crate) fn status_requested(&self) -> bool {
        self.status_requested
    }

    fn is_complete(&self, sn: SequenceNumber) -> bool {
        self.entries[sn.index()].as_ref().is_some_and(RxEntry::is_complete)
    }

    /// 缓存中的 SN 数（含不完整的）
    pub(crate) fn buffered(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub(crate) fn receive_data(
        &mut self,
        pdu: AmdPdu,
        now: SimTime,
        timers: &mut TimerTable,
        stats: &mut RlcStats,
    ) -> Vec<Bytes> {
        let sn = pdu.header.sn;
        if pdu.header.poll {
            self.status_requested = true;
        }
        if !sn.in_window(self.vr_r, self.window_size) {
            stats.rx_out_of_window += 1;
            debug!(%sn, vr_r = %self.vr_r, "PDU outside reception window");
            return Vec::new();
        }
        if self.is_complete(sn) {
            stats.rx_duplicates += 1;
            return Vec::new();
        }
        let entry = self.entries[sn.index()].get_or_insert_with(RxEntry::default);
        if entry.insert(&pdu.header, pdu.payload) == 0 {
            stats.rx_duplicates += 1;
            trace!(%sn, "no new bytes");
            return Vec::new();
        }
        let complete = entry.is_complete();

        if sn.offset_from(self.vr_r) >= self.vr_h.offset_from(self.vr_r) {
            self.vr_h = sn.next();
        }
        if complete && sn == self.vr_ms {
            self.advance_vr_ms();
        }
        let mut out = Vec::new();
        if complete && sn == self.vr_r {
            self.drain(&mut out, stats);
        }

        if timers.is_running(TimerKind::Reordering) {
            let x = self.vr_x;
            let outside = !x.in_window(self.vr_r, self.window_size) && x != self.vr_mr();
            if x == self.vr_r || outside {
                timers.cancel(TimerKind::Reordering);
            }
        }
        self.maybe_start_reordering(now, timers);
        out
    }

    fn maybe_start_reordering(&mut self, now: SimTime, timers: &mut TimerTable) {
        if !timers.is_running(TimerKind::Reordering) && self.vr_h != self.vr_r {
            timers.arm(TimerKind::Reordering, now, self.reordering);
            self.vr_x = self.vr_h;
        }
    }

    fn advance_vr_ms(&mut self) {
        while self.vr_ms != self.vr_h && self.is_complete(self.vr_ms) {
            self.vr_ms = self.vr_ms.next();
        }
    }

    /// 从 VR(R) 起把连续完整的条目交给 SDU 重组
    fn drain(&mut self, out: &mut Vec<Bytes>, stats: &mut RlcStats) {
        let base = self.vr_r;
        let before = out.len();
        while self.is_complete(self.vr_r) {
            if let Some(entry) = self.entries[self.vr_r.index()].take() {
                self.reassembler.on_pdu(entry.into_pdu(), out, stats);
            }
            self.vr_r = self.vr_r.next();
        }
        if self.vr_ms.offset_from(base) < self.vr_r.offset_from(base) {
            self.vr_ms = self.vr_r;
        }
        stats.rx_sdus_delivered += (out.len() - before) as u64;
    }

    /// 放弃 VR(X) 之前所有不完整的 SN
    pub(crate) fn on_reordering_expiry(
        &mut self,
        now: SimTime,
        timers: &mut TimerTable,
        stats: &mut RlcStats,
    ) -> Vec<Bytes> {
        let mut out = Vec::new();
        let gap = self.vr_x.offset_from(self.vr_r);
        if gap <= self.window_size {
            let base = self.vr_r;
            while self.vr_r != self.vr_x {
                match self.entries[self.vr_r.index()].take() {
                    Some(entry) if entry.is_complete() => {
                        self.reassembler.on_pdu(entry.into_pdu(), &mut out, stats);
                    }
                    _ => {
                        stats.rx_pdus_lost += 1;
                        self.reassembler.on_loss(stats);
                        debug!(sn = %self.vr_r, "PDU declared lost");
                    }
                }
                self.vr_r = self.vr_r.next();
            }
            stats.rx_sdus_delivered += out.len() as u64;
            self.drain(&mut out, stats);
            if self.vr_ms.offset_from(base) < self.vr_r.offset_from(base) {
                self.vr_ms = self.vr_r;
            }
            self.advance_vr_ms();
        }
        self.status_requested = true;
        self.maybe_start_reordering(now, timers);
        out
    }

    fn nacks_for(&self, sn: SequenceNumber) -> Vec<Nack> {
        match &self.entries[sn.index()] {
            None => vec![Nack::whole(sn)],
            Some(e) if e.is_complete() => Vec::new(),
            Some(e) => e
                .missing_ranges()
                .into_iter()
                .map(|(start, end)| {
                    let so_end = end.map_or(SO_END_OF_PDU, |e| (e - 1) as u16);
                    Nack::segment(sn, start as u16, so_end)
                })
                .collect(),
        }
    }

    fn collect_status(&self, budget_bits: usize) -> StatusPdu {
        let fixed = StatusPdu::bits_for(std::iter::empty());
        let mut bits = fixed;
        let mut ack_sn = self.vr_h;
        let mut nacks = Vec::new();
        for off in 0..self.vr_h.offset_from(self.vr_r) {
            let sn = self.vr_r + off;
            let candidate = self.nacks_for(sn);
            if candidate.is_empty() {
                continue;
            }
            let extra = StatusPdu::bits_for(&candidate) - fixed;
            if bits + extra > budget_bits {
                ack_sn = sn;
                break;
            }
            bits += extra;
            nacks.extend(candidate);
        }
        StatusPdu { ack_sn, nacks }
    }

    /// 此刻会发送的 STATUS PDU 大小；没有待发状态报告时为 0
    pub(crate) fn pending_status_len(&self) -> usize {
        if !self.status_requested {
            return 0;
        }
        self.collect_status(usize::MAX).serialized_len()
    }

    /// 构造不超过 `max_bytes` 的 STATUS PDU，并清除待发标志
    pub(crate) fn build_status(&mut self, max_bytes: usize) -> Option<StatusPdu> {
        if max_bytes < StatusPdu::MIN_LEN {
            return None;
        }
        let status = self.collect_status(max_bytes.saturating_mul(8));
        self.status_requested = false;
        Some(status)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
        self.reassembler = SduReassembler::default();
        self.status_requested = false;
    }
}
