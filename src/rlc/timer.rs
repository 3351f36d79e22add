//! Engine-owned timer table.
//!
//! The entity never talks to a scheduler directly. Arming a timer records a
//! [`TimerRequest`]; the driver drains those with `take_requests`, schedules
//! a callback at `at`, and hands the `generation` back on expiry. A fire whose
//! generation no longer matches (the timer was cancelled or restarted in the
//! meantime) is ignored.

use serde::Serialize;

use crate::sim::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    PollRetransmit,
    Reordering,
    StatusProhibit,
    /// Periodic buffer status report.
    Rbs,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::PollRetransmit,
        TimerKind::Reordering,
        TimerKind::StatusProhibit,
        TimerKind::Rbs,
    ];

    fn index(self) -> usize {
        match self {
            TimerKind::PollRetransmit => 0,
            TimerKind::Reordering => 1,
            TimerKind::StatusProhibit => 2,
            TimerKind::Rbs => 3,
        }
    }
}

/// A timer that the driver must schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub kind: TimerKind,
    pub at: SimTime,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerSlot {
    deadline: Option<SimTime>,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct TimerTable {
    slots: [TimerSlot; 4],
    requests: Vec<TimerRequest>,
}

impl TimerTable {
    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].deadline.is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<SimTime> {
        self.slots[kind.index()].deadline
    }

    pub fn generation(&self, kind: TimerKind) -> u64 {
        self.slots[kind.index()].generation
    }

    /// Start `kind` unless it is already running. Returns whether it was started.
    pub fn arm(&mut self, kind: TimerKind, now: SimTime, duration: SimTime) -> bool {
        let slot = &mut self.slots[kind.index()];
        if slot.deadline.is_some() {
            return false;
        }
        slot.generation = slot.generation.wrapping_add(1);
        let at = now.saturating_add(duration);
        slot.deadline = Some(at);
        self.requests.push(TimerRequest {
            kind,
            at,
            generation: slot.generation,
        });
        true
    }

    pub fn restart(&mut self, kind: TimerKind, now: SimTime, duration: SimTime) {
        self.cancel(kind);
        self.arm(kind, now, duration);
    }

    /// Stop `kind`; any fire already scheduled for it becomes stale.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let slot = &mut self.slots[kind.index()];
        if slot.deadline.take().is_none() {
            return false;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.requests.retain(|r| r.kind != kind);
        true
    }

    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
        self.requests.clear();
    }

    /// Consume a fire. `false` for stale or unknown fires.
    pub fn fire(&mut self, kind: TimerKind, generation: u64) -> bool {
        let slot = &mut self.slots[kind.index()];
        if slot.deadline.is_none() || slot.generation != generation {
            return false;
        }
        slot.deadline = None;
        true
    }

    pub fn take_requests(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Earliest running timer.
    pub fn next_deadline(&self) -> Option<(TimerKind, SimTime)> {
        TimerKind::ALL
            .into_iter()
            .filter_map(|k| self.deadline(k).map(|at| (k, at)))
            .min_by_key(|&(_, at)| at)
    }
}
