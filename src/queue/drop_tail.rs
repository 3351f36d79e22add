//! DropTail（尾丢弃）队列
//!
//! 当队列容量不足时，直接拒绝新到达的 SDU。

use std::collections::VecDeque;

use crate::sim::SimTime;

use super::{QueuedSdu, SduQueue};

#[derive(Debug)]
pub struct DropTailQueue {
    max_bytes: u64,
    cur_bytes: u64,
    q: VecDeque<QueuedSdu>,
}

impl DropTailQueue {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            cur_bytes: 0,
            q: VecDeque::new(),
        }
    }
}

impl SduQueue for DropTailQueue {
    fn enqueue(&mut self, sdu: QueuedSdu, _now: SimTime) -> Result<(), QueuedSdu> {
        let sz = sdu.size_bytes();
        if self.cur_bytes.saturating_add(sz) > self.max_bytes {
            return Err(sdu);
        }
        self.cur_bytes = self.cur_bytes.saturating_add(sz);
        self.q.push_back(sdu);
        Ok(())
    }

    fn dequeue(&mut self, _now: SimTime) -> Option<QueuedSdu> {
        let sdu = self.q.pop_front()?;
        self.cur_bytes = self.cur_bytes.saturating_sub(sdu.size_bytes());
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
}
