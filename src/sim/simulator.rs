//! 仿真器
//!
//! 事件驱动仿真器：维护当前时间与按 (时间, 序号) 排序的事件队列。
//! 同一时刻的事件按调度先后执行。

use super::event::Event;
use super::time::SimTime;
use super::world::World;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, info, trace};

struct ScheduledEvent {
    at: SimTime,
    seq: u64,
    ev: Box<dyn Event>,
}

// BinaryHeap 是 max-heap：把 (at, seq) 反过来比较，最早的事件在堆顶。
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl Eq for ScheduledEvent {}

#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    executed: u64,
    q: BinaryHeap<ScheduledEvent>,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 尚未执行的事件数
    pub fn pending(&self) -> usize {
        self.q.len()
    }

    /// 已执行的事件数
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// 调度事件在指定时间执行；早于当前时间的时刻按当前时间处理。
    #[tracing::instrument(skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) {
        let at = at.max(self.now);
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            at,
            seq,
            ev: Box::new(ev),
        });
    }

    /// 在 `now + delay` 调度
    pub fn schedule_in<E: Event>(&mut self, delay: SimTime, ev: E) {
        self.schedule(self.now.saturating_add(delay), ev);
    }

    fn step(&mut self, item: ScheduledEvent, world: &mut dyn World) {
        self.executed += 1;
        self.now = item.at;
        item.ev.execute(self, world);
        world.on_tick(self);
    }

    /// 运行直到事件队列为空或到达 `until`。
    #[tracing::instrument(skip(self, world))]
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        while self.q.peek().is_some_and(|top| top.at <= until) {
            let Some(item) = self.q.pop() else {
                break;
            };
            self.step(item, world);
        }
        self.now = self.now.max(until);
        debug!(now = ?self.now, remaining_queue = self.q.len(), "到达截止时间");
    }

    /// 运行所有事件直到队列为空。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("开始运行仿真");
        let start = self.executed;
        while let Some(item) = self.q.pop() {
            trace!(at = ?item.at, seq = item.seq, remaining_queue = self.q.len(), "执行事件");
            self.step(item, world);
        }
        info!(
            total_events = self.executed - start,
            final_time = ?self.now,
            "仿真完成"
        );
    }
}
