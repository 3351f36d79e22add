//! 队列策略（Queue disciplines）
//!
//! RLC 发送缓冲前面挂一个可替换的 SDU 队列：默认 DropTail（尾丢弃），
//! 开启 `enable_aqm` 时使用 CoDel。队列可以拒绝入队，也可以在出队时丢弃。

use bytes::Bytes;

use crate::sim::SimTime;

mod codel;
mod drop_tail;

pub use codel::CoDelQueue;
pub use drop_tail::DropTailQueue;

/// 一个排队中的 SDU，带入队时间（用于 CoDel 的逗留时间与 HOL 时延）。
#[derive(Debug, Clone)]
pub struct QueuedSdu {
    pub id: u64,
    pub data: Bytes,
    pub enqueued_at: SimTime,
}

impl QueuedSdu {
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// SDU 队列抽象
pub trait SduQueue: std::fmt::Debug {
    /// 入队：成功返回 Ok；若被丢弃则返回 Err(sdu)
    fn enqueue(&mut self, sdu: QueuedSdu, now: SimTime) -> Result<(), QueuedSdu>;
    /// 出队：按队列策略返回下一个 SDU（AQM 可能在此丢弃若干 SDU）
    fn dequeue(&mut self, now: SimTime) -> Option<QueuedSdu>;
    fn peek(&self) -> Option<&QueuedSdu>;
    /// 按出队顺序遍历（用于切换时的转发缓冲）
    fn iter(&self) -> Box<dyn Iterator<Item = &QueuedSdu> + '_>;
    fn clear(&mut self);

    fn len(&self) -> usize;
    fn bytes(&self) -> u64;
    fn capacity_bytes(&self) -> u64;
    /// 出队时被策略丢弃的 SDU 总数
    fn dropped(&self) -> u64 {
        0
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 按配置选择队列策略。容量由发送缓冲自己把关，这里不再限制。
pub fn new_sdu_queue(enable_aqm: bool) -> Box<dyn SduQueue> {
    if enable_aqm {
        Box::new(CoDelQueue::new(u64::MAX))
    } else {
        Box::new(DropTailQueue::new(u64::MAX))
    }
}
