//! CoDel（Controlled Delay）主动队列管理
//!
//! 依据 RFC 8289：当队头 SDU 的逗留时间持续超过 `target` 达一个 `interval`，
//! 进入丢弃状态，并按 `interval / sqrt(count)` 的节奏继续丢弃，直到逗留时间回落。

use std::collections::VecDeque;

use tracing::trace;

use crate::sim::SimTime;

use super::{QueuedSdu, SduQueue};

/// 队列里只剩不超过一个 MTU 时不丢包
const MTU_BYTES: u64 = 1500;

#[derive(Debug)]
pub struct CoDelQueue {
    max_bytes: u64,
    cur_bytes: u64,
    q: VecDeque<QueuedSdu>,
    target: SimTime,
    interval: SimTime,
    first_above_time: Option<SimTime>,
    dropping: bool,
    drop_next: SimTime,
    count: u32,
    last_count: u32,
    dropped: u64,
}

impl CoDelQueue {
    pub fn new(max_bytes: u64) -> Self {
        Self::with_params(max_bytes, SimTime::from_millis(5), SimTime::from_millis(100))
    }

    pub fn with_params(max_bytes: u64, target: SimTime, interval: SimTime) -> Self {
        Self {
            max_bytes,
            cur_bytes: 0,
            q: VecDeque::new(),
            target,
            interval,
            first_above_time: None,
            dropping: false,
            drop_next: SimTime::ZERO,
            count: 0,
            last_count: 0,
            dropped: 0,
        }
    }

    pub fn is_dropping(&self) -> bool {
        self.dropping
    }

    fn pop(&mut self) -> Option<QueuedSdu> {
        let sdu = self.q.pop_front()?;
        self.cur_bytes = self.cur_bytes.saturating_sub(sdu.size_bytes());
        Some(sdu)
    }

    /// 按队头 SDU 的逗留时间更新 `first_above_time`
    fn track_sojourn(&mut self, sdu: &QueuedSdu, now: SimTime) {
        let sojourn = now.saturating_sub(sdu.enqueued_at);
        if sojourn < self.target || self.cur_bytes <= MTU_BYTES {
            self.first_above_time = None;
        } else if self.first_above_time.is_none() {
            self.first_above_time = Some(now.saturating_add(self.interval));
        }
    }

    fn ok_to_drop(&mut self, sdu: &QueuedSdu, now: SimTime) -> bool {
        let above_since = self.first_above_time;
        self.track_sojourn(sdu, now);
        match (above_since, self.first_above_time) {
            (Some(t), Some(_)) => now >= t,
            _ => false,
        }
    }

    fn control_law(&self, t: SimTime) -> SimTime {
        let step = self.interval.0 as f64 / (self.count.max(1) as f64).sqrt();
        t.saturating_add(SimTime(step as u64))
    }

    fn record_drop(&mut self, sdu: &QueuedSdu, now: SimTime) {
        self.dropped = self.dropped.saturating_add(1);
        trace!(
            sdu_id = sdu.id,
            sojourn = ?now.saturating_sub(sdu.enqueued_at),
            count = self.count,
            "CoDel 丢弃 SDU"
        );
    }
}

impl SduQueue for CoDelQueue {
    fn enqueue(&mut self, sdu: QueuedSdu, _now: SimTime) -> Result<(), QueuedSdu> {
        let sz = sdu.size_bytes();
        if self.cur_bytes.saturating_add(sz) > self.max_bytes {
            return Err(sdu);
        }
        self.cur_bytes = self.cur_bytes.saturating_add(sz);
        self.q.push_back(sdu);
        Ok(())
    }

    fn dequeue(&mut self, now: SimTime) -> Option<QueuedSdu> {
        let mut sdu = self.pop()?;
        let drop = self.ok_to_drop(&sdu, now);

        if self.dropping {
            if !drop {
                self.dropping = false;
            }
            while self.dropping && now >= self.drop_next {
                self.record_drop(&sdu, now);
                self.count = self.count.saturating_add(1);
                sdu = match self.pop() {
                    Some(next) => next,
                    None => {
                        self.dropping = false;
                        return None;
                    }
                };
                if self.ok_to_drop(&sdu, now) {
                    self.drop_next = self.control_law(self.drop_next);
                } else {
                    self.dropping = false;
                }
            }
        } else if drop {
            self.record_drop(&sdu, now);
            self.dropping = true;
            let delta = self.count.saturating_sub(self.last_count);
            let recently = now.saturating_sub(self.drop_next) < SimTime(self.interval.0.saturating_mul(16));
            self.count = if delta > 1 && recently { delta } else { 1 };
            self.drop_next = self.control_law(now);
            self.last_count = self.count;
            sdu = self.pop()?;
            self.track_sojourn(&sdu, now);
        }

        Some(sdu)
    }

    fn peek(&self) -> Option<&QueuedSdu> {
        self.q.front()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &QueuedSdu> + '_> {
        Box::new(self.q.iter())
    }

    fn clear(&mut self) {
        self.q.clear();
        self.cur_bytes = 0;
        self.first_above_time = None;
        self.dropping = false;
    }

    fn len(&self) -> usize {
        self.q.len()
    }

    fn bytes(&self) -> u64 {
        self.cur_bytes
    }

    fn capacity_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn dropped(&self) -> u64 {
        self.dropped
    }
}
