use crate::rlc::{TimerKind, TimerTable};
use crate::sim::SimTime;

fn ms(v: u64) -> SimTime {
    SimTime::from_millis(v)
}

#[test]
fn arming_a_running_timer_is_a_no_op() {
    let mut t = TimerTable::default();
    assert!(t.arm(TimerKind::Reordering, SimTime::ZERO, ms(10)));
    let generation = t.generation(TimerKind::Reordering);
    assert!(!t.arm(TimerKind::Reordering, ms(5), ms(10)));
    assert_eq!(t.deadline(TimerKind::Reordering), Some(ms(10)));
    assert_eq!(t.generation(TimerKind::Reordering), generation);

    let reqs = t.take_requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].kind, TimerKind::Reordering);
    assert_eq!(reqs[0].at, ms(10));
    assert!(t.take_requests().is_empty());
}

#[test]
fn restart_makes_the_previous_fire_stale() {
    let mut t = TimerTable::default();
    t.arm(TimerKind::PollRetransmit, SimTime::ZERO, ms(20));
    let old = t.take_requests()[0];

    t.restart(TimerKind::PollRetransmit, ms(5), ms(20));
    let new = t.take_requests()[0];
    assert_ne!(old.generation, new.generation);
    assert_eq!(new.at, ms(25));

    assert!(!t.fire(TimerKind::PollRetransmit, old.generation));
    assert!(t.is_running(TimerKind::PollRetransmit));
    assert!(t.fire(TimerKind::PollRetransmit, new.generation));
    assert!(!t.is_running(TimerKind::PollRetransmit));
    // a second delivery of the same fire is ignored
    assert!(!t.fire(TimerKind::PollRetransmit, new.generation));
}

#[test]
fn cancel_drops_undrained_requests() {
    let mut t = TimerTable::default();
    t.arm(TimerKind::StatusProhibit, SimTime::ZERO, ms(10));
    t.arm(TimerKind::Rbs, SimTime::ZERO, ms(10));
    assert!(t.cancel(TimerKind::StatusProhibit));
    assert!(!t.cancel(TimerKind::StatusProhibit));

    let reqs = t.take_requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].kind, TimerKind::Rbs);
}

#[test]
fn cancel_all_stops_every_timer() {
    let mut t = TimerTable::default();
    for (i, kind) in TimerKind::ALL.into_iter().enumerate() {
        t.arm(kind, SimTime::ZERO, ms(i as u64 + 1));
    }
    assert_eq!(t.next_deadline(), Some((TimerKind::PollRetransmit, ms(1))));
    let reqs = t.take_requests();

    t.cancel_all();
    assert_eq!(t.next_deadline(), None);
    for req in reqs {
        assert!(!t.is_running(req.kind));
        assert!(!t.fire(req.kind, req.generation));
    }
}
