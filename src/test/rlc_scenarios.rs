use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use crate::error::RlcError;
use crate::net::{EndpointLog, LogSap};
use crate::rlc::status::SO_END_OF_PDU;
use crate::rlc::{
    AmdHeader, AmdPdu, FramingInfo, Nack, PduState, RlcAm, RlcAmConfig, SegmentInfo,
    SequenceNumber, StatusPdu, TimerKind,
};
use crate::sim::SimTime;

fn entity(config: RlcAmConfig) -> (RlcAm, Rc<RefCell<EndpointLog>>) {
    let log = Rc::new(RefCell::new(EndpointLog::default()));
    let rlc = RlcAm::with_saps(
        config,
        Box::new(LogSap(Rc::clone(&log))),
        Box::new(LogSap(Rc::clone(&log))),
    )
    .expect("valid config");
    (rlc, log)
}

fn sn(v: u16) -> SequenceNumber {
    SequenceNumber::new(v)
}

fn ms(v: u64) -> SimTime {
    SimTime::from_millis(v)
}

/// Expire the currently armed `kind` timer.
fn fire(rlc: &mut RlcAm, kind: TimerKind, now: SimTime) -> bool {
    let generation = rlc.timers().generation(kind);
    rlc.expire_timer(kind, generation, now)
}

fn data_pdu(v: u16, framing: FramingInfo, lis: Vec<u16>, payload: &[u8], poll: bool) -> Bytes {
    AmdPdu {
        header: AmdHeader {
            sn: sn(v),
            poll,
            framing,
            segment: None,
            length_indicators: lis,
        },
        payload: Bytes::copy_from_slice(payload),
    }
    .encode()
}

fn status(ack: u16, nacks: Vec<Nack>) -> Bytes {
    StatusPdu {
        ack_sn: sn(ack),
        nacks,
    }
    .encode()
}

#[test]
fn large_sdu_is_segmented_to_the_opportunity() {
    let (mut tx, _) = entity(RlcAmConfig {
        max_tx_buffer_size: 5_000,
        ..RlcAmConfig::default()
    });
    tx.transmit_pdcp_pdu(Bytes::from(vec![7u8; 3_000]), SimTime::ZERO)
        .expect("fits");

    let pdu = tx
        .notify_tx_opportunity(1_500, 0, SimTime::ZERO)
        .expect("new data");
    assert!(pdu.len() <= 1_500);
    let decoded = AmdPdu::decode(pdu).expect("decodes");
    assert_eq!(decoded.header.sn, sn(0));
    assert_eq!(decoded.header.framing, FramingInfo::First);
    assert!(decoded.header.length_indicators.is_empty());
    assert_eq!(decoded.payload.len(), 1_498);
    assert_eq!(tx.tx_buffer_occupancy(), 3_000 - 1_498);
    assert_eq!(tx.vt_s(), sn(1));

    let rest = AmdPdu::decode(
        tx.notify_tx_opportunity(1_600, 1, SimTime::ZERO)
            .expect("remainder"),
    )
    .expect("decodes");
    assert_eq!(rest.header.framing, FramingInfo::Last);
    assert_eq!(rest.payload.len(), 1_502);
    assert_eq!(tx.tx_buffer_occupancy(), 0);
}

#[test]
fn full_buffer_discards_the_sdu() {
    let (mut tx, _) = entity(RlcAmConfig {
        max_tx_buffer_size: 5_000,
        ..RlcAmConfig::default()
    });
    tx.transmit_pdcp_pdu(Bytes::from(vec![1u8; 3_000]), SimTime::ZERO)
        .expect("fits");
    let err = tx
        .transmit_pdcp_pdu(Bytes::from(vec![2u8; 3_000]), SimTime::ZERO)
        .expect_err("buffer full");
    assert!(matches!(err, RlcError::TxBufferFull { .. }));
    assert_eq!(tx.stats().tx_sdus_accepted, 1);
    assert_eq!(tx.stats().tx_sdus_discarded, 1);
    assert_eq!(tx.tx_buffer_occupancy(), 3_000);
}

#[test]
fn several_small_sdus_share_one_pdu() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    for fill in 1..=3u8 {
        tx.transmit_pdcp_pdu(Bytes::from(vec![fill; 10]), SimTime::ZERO)
            .expect("fits");
    }
    let pdu = AmdPdu::decode(tx.notify_tx_opportunity(100, 0, SimTime::ZERO).expect("pdu"))
        .expect("decodes");
    assert_eq!(pdu.header.framing, FramingInfo::Full);
    assert_eq!(pdu.header.length_indicators, vec![10, 10]);
    assert_eq!(pdu.payload.len(), 30);
    // buffer drained: the PDU carries a poll
    assert!(pdu.header.poll);
    assert!(tx.timers().is_running(TimerKind::PollRetransmit));
    assert_eq!(tx.poll_sn(), sn(0));

    let (mut rx, log) = entity(RlcAmConfig::default());
    rx.receive_pdu(pdu.encode(), SimTime::ZERO).expect("valid");
    assert_eq!(log.borrow().delivered.len(), 3);
    assert_eq!(log.borrow().delivered[2], Bytes::from(vec![3u8; 10]));
    assert!(rx.status_pending());
}

#[test]
fn transmit_window_stalls_until_acknowledged() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    for i in 0..513u32 {
        tx.transmit_pdcp_pdu(Bytes::from(vec![i as u8; 10]), SimTime::ZERO)
            .expect("fits");
    }
    for i in 0..512u32 {
        let pdu = tx
            .notify_tx_opportunity(12, (i % 8) as u8, SimTime::ZERO)
            .expect("window open");
        assert_eq!(pdu.len(), 12);
    }
    assert_eq!(tx.vt_s(), sn(512));
    assert_eq!(tx.vt_ms(), sn(512));
    assert!(tx.notify_tx_opportunity(12, 0, SimTime::ZERO).is_none());
    assert_eq!(tx.stats().window_stalls, 1);
    assert_eq!(tx.tx_buffer_occupancy(), 10);

    tx.receive_pdu(status(10, vec![]), ms(1)).expect("valid");
    assert_eq!(tx.vt_a(), sn(10));
    assert_eq!(tx.vt_ms(), sn(522));
    let pdu = AmdPdu::decode(tx.notify_tx_opportunity(12, 1, ms(1)).expect("unblocked"))
        .expect("decodes");
    assert_eq!(pdu.header.sn, sn(512));
}

#[test]
fn status_beyond_vt_s_is_ignored() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    tx.transmit_pdcp_pdu(Bytes::from_static(b"hello"), SimTime::ZERO)
        .expect("fits");
    tx.notify_tx_opportunity(100, 0, SimTime::ZERO).expect("pdu");

    tx.receive_pdu(status(5, vec![]), ms(1)).expect("decodes");
    assert_eq!(tx.vt_a(), sn(0));
    assert_eq!(tx.retx_count(sn(0)), Some(0));
    assert!(tx.timers().is_running(TimerKind::PollRetransmit));

    tx.receive_pdu(status(1, vec![]), ms(2)).expect("decodes");
    assert_eq!(tx.vt_a(), sn(1));
    assert!(!tx.timers().is_running(TimerKind::PollRetransmit));
    assert!(tx.forwarding_sdus().is_empty());
}

#[test]
fn reordering_expiry_skips_the_hole_and_discards_the_broken_sdu() {
    let config = RlcAmConfig {
        reordering_timer: ms(100),
        ..RlcAmConfig::default()
    };
    let (mut rx, log) = entity(config);
    for v in 0..5u16 {
        rx.receive_pdu(data_pdu(v, FramingInfo::Full, vec![], &[v as u8; 4], false), ms(1))
            .expect("valid");
    }
    rx.receive_pdu(data_pdu(5, FramingInfo::First, vec![], b"abc", false), ms(2))
        .expect("valid");
    // SN 6 (middle of SDU 5) never arrives
    rx.receive_pdu(
        data_pdu(7, FramingInfo::Last, vec![3], b"xyzfull", false),
        ms(3),
    )
    .expect("valid");

    assert_eq!(log.borrow().delivered.len(), 5);
    assert_eq!(rx.vr_r(), sn(6));
    assert_eq!(rx.vr_h(), sn(8));
    assert_eq!(rx.vr_x(), sn(8));
    assert_eq!(rx.timers().deadline(TimerKind::Reordering), Some(ms(103)));

    assert!(fire(&mut rx, TimerKind::Reordering, ms(103)));
    assert_eq!(rx.vr_r(), sn(8));
    assert_eq!(rx.vr_ms(), sn(8));
    assert_eq!(rx.stats().rx_pdus_lost, 1);
    assert_eq!(rx.stats().rx_sdus_discarded, 1);
    assert_eq!(rx.stats().rx_sdus_delivered, 6);
    assert_eq!(log.borrow().delivered.last(), Some(&Bytes::from_static(b"full")));
    assert!(!rx.timers().is_running(TimerKind::Reordering));

    let report = StatusPdu::decode(&rx.notify_tx_opportunity(100, 0, ms(104)).expect("status"))
        .expect("decodes");
    assert_eq!(report, StatusPdu::ack_only(sn(8)));

    // a late copy of SN 6 is now below VR(R)
    rx.receive_pdu(data_pdu(6, FramingInfo::Middle, vec![], b"def", false), ms(105))
        .expect("valid");
    assert_eq!(rx.stats().rx_out_of_window, 1);
    assert_eq!(log.borrow().delivered.len(), 6);
}

#[test]
fn retransmitted_hole_is_delivered_before_reordering_expiry() {
    let (mut rx, log) = entity(RlcAmConfig::default());
    rx.receive_pdu(data_pdu(0, FramingInfo::Full, vec![], b"zero", false), ms(1))
        .expect("valid");
    rx.receive_pdu(data_pdu(2, FramingInfo::Full, vec![], b"two", true), ms(1))
        .expect("valid");
    assert_eq!(log.borrow().delivered.len(), 1);
    assert!(rx.timers().is_running(TimerKind::Reordering));

    let report = StatusPdu::decode(&rx.notify_tx_opportunity(100, 0, ms(2)).expect("status"))
        .expect("decodes");
    assert_eq!(report.ack_sn, sn(3));
    assert_eq!(report.nacks, vec![Nack::whole(sn(1))]);

    rx.receive_pdu(data_pdu(1, FramingInfo::Full, vec![], b"one", false), ms(5))
        .expect("valid");
    let delivered: Vec<Bytes> = log.borrow().delivered.clone();
    assert_eq!(
        delivered,
        vec![
            Bytes::from_static(b"zero"),
            Bytes::from_static(b"one"),
            Bytes::from_static(b"two")
        ]
    );
    assert_eq!(rx.vr_r(), sn(3));
    assert!(!rx.timers().is_running(TimerKind::Reordering));
}

#[test]
fn duplicate_pdus_are_delivered_once() {
    let (mut rx, log) = entity(RlcAmConfig::default());
    let pdu = data_pdu(0, FramingInfo::Full, vec![], b"once", false);
    rx.receive_pdu(pdu.clone(), ms(1)).expect("valid");
    // already delivered: VR(R) has moved past it
    rx.receive_pdu(pdu, ms(2)).expect("valid");
    assert_eq!(log.borrow().delivered.len(), 1);
    assert_eq!(rx.stats().rx_out_of_window, 1);

    let held = data_pdu(3, FramingInfo::Full, vec![], b"held", false);
    rx.receive_pdu(held.clone(), ms(3)).expect("valid");
    rx.receive_pdu(held, ms(4)).expect("valid");
    assert_eq!(rx.stats().rx_duplicates, 1);
    assert_eq!(rx.rx_buffered(), 1);
    assert_eq!(rx.vr_h(), sn(4));
}

#[test]
fn receiver_drops_pdus_outside_the_window() {
    let (mut rx, log) = entity(RlcAmConfig::default());
    rx.receive_pdu(data_pdu(600, FramingInfo::Full, vec![], b"far", false), ms(1))
        .expect("valid");
    assert_eq!(rx.stats().rx_out_of_window, 1);
    assert_eq!(rx.vr_h(), sn(0));
    assert_eq!(rx.vr_mr(), sn(512));
    assert!(log.borrow().delivered.is_empty());
    assert!(!rx.timers().is_running(TimerKind::Reordering));
}

#[test]
fn segments_are_reassembled_and_missing_bytes_nacked() {
    let (mut rx, log) = entity(RlcAmConfig::default());
    let head = AmdPdu {
        header: AmdHeader {
            sn: sn(0),
            poll: true,
            framing: FramingInfo::First,
            segment: Some(SegmentInfo {
                offset: 0,
                last: false,
            }),
            length_indicators: vec![],
        },
        payload: Bytes::from_static(b"01234"),
    };
    rx.receive_pdu(head.encode(), ms(1)).expect("valid");

    let report = StatusPdu::decode(&rx.notify_tx_opportunity(100, 0, ms(1)).expect("status"))
        .expect("decodes");
    assert_eq!(report.ack_sn, sn(1));
    assert_eq!(report.nacks, vec![Nack::segment(sn(0), 5, SO_END_OF_PDU)]);

    let tail = AmdPdu {
        header: AmdHeader {
            sn: sn(0),
            poll: false,
            framing: FramingInfo::Last,
            segment: Some(SegmentInfo {
                offset: 5,
                last: true,
            }),
            length_indicators: vec![],
        },
        payload: Bytes::from_static(b"56789"),
    };
    rx.receive_pdu(tail.encode(), ms(2)).expect("valid");
    assert_eq!(log.borrow().delivered, vec![Bytes::from_static(b"0123456789")]);
    assert_eq!(rx.vr_r(), sn(1));
}

#[test]
fn status_is_truncated_to_the_opportunity() {
    let (mut rx, _) = entity(RlcAmConfig::default());
    for v in [0u16, 2, 4, 6] {
        rx.receive_pdu(data_pdu(v, FramingInfo::Full, vec![], b"x", v == 6), ms(1))
            .expect("valid");
    }
    assert!(rx.status_pending());
    // 15 fixed bits plus one 12-bit NACK fit in four bytes, two do not
    let report = StatusPdu::decode(&rx.notify_tx_opportunity(4, 0, ms(1)).expect("status"))
        .expect("decodes");
    assert_eq!(report.ack_sn, sn(3));
    assert_eq!(report.nacks, vec![Nack::whole(sn(1))]);
    assert!(!rx.status_pending());
    assert!(rx.timers().is_running(TimerKind::StatusProhibit));
    assert_eq!(rx.stats().status_pdus_sent, 1);
}

#[test]
fn status_prohibit_defers_the_next_report() {
    let (mut rx, _) = entity(RlcAmConfig::default());
    rx.receive_pdu(data_pdu(0, FramingInfo::Full, vec![], b"a", true), ms(1))
        .expect("valid");
    rx.notify_tx_opportunity(10, 0, ms(1)).expect("status");
    rx.receive_pdu(data_pdu(1, FramingInfo::Full, vec![], b"b", true), ms(2))
        .expect("valid");
    assert!(rx.status_pending());
    assert!(rx.notify_tx_opportunity(10, 1, ms(3)).is_none());

    assert!(fire(&mut rx, TimerKind::StatusProhibit, ms(11)));
    let report = StatusPdu::decode(&rx.notify_tx_opportunity(10, 2, ms(12)).expect("status"))
        .expect("decodes");
    assert_eq!(report, StatusPdu::ack_only(sn(2)));
}

#[test]
fn nack_triggers_retransmission_of_the_missing_bytes() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    for fill in 0..3u8 {
        tx.transmit_pdcp_pdu(Bytes::from(vec![fill; 20]), SimTime::ZERO)
            .expect("fits");
        tx.notify_tx_opportunity(22, fill, SimTime::ZERO).expect("pdu");
    }
    assert_eq!(tx.vt_s(), sn(3));

    tx.receive_pdu(
        status(3, vec![Nack::whole(sn(1)), Nack::segment(sn(2), 5, 9)]),
        ms(1),
    )
    .expect("valid");
    assert_eq!(tx.vt_a(), sn(1));
    assert_eq!(tx.pdu_state(sn(0)), None);
    assert_eq!(tx.pdu_state(sn(1)), Some(PduState::RetxPending));
    assert_eq!(tx.retx_count(sn(2)), Some(1));

    let whole = AmdPdu::decode(tx.notify_tx_opportunity(100, 3, ms(2)).expect("retx"))
        .expect("decodes");
    assert_eq!(whole.header.sn, sn(1));
    assert!(whole.header.segment.is_none());
    assert_eq!(whole.payload, Bytes::from(vec![1u8; 20]));

    let seg = AmdPdu::decode(tx.notify_tx_opportunity(100, 4, ms(2)).expect("retx"))
        .expect("decodes");
    assert_eq!(seg.header.sn, sn(2));
    assert_eq!(
        seg.header.segment,
        Some(SegmentInfo {
            offset: 5,
            last: false
        })
    );
    assert_eq!(seg.header.framing, FramingInfo::Middle);
    assert_eq!(seg.payload.len(), 5);
    assert_eq!(tx.stats().retx_pdus, 2);
}

#[test]
fn retransmission_is_resegmented_to_fit() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    tx.transmit_pdcp_pdu(Bytes::from(vec![9u8; 100]), SimTime::ZERO)
        .expect("fits");
    tx.notify_tx_opportunity(200, 0, SimTime::ZERO).expect("pdu");
    tx.receive_pdu(status(1, vec![Nack::whole(sn(0))]), ms(1))
        .expect("valid");

    let first = AmdPdu::decode(tx.notify_tx_opportunity(44, 1, ms(2)).expect("segment"))
        .expect("decodes");
    assert_eq!(first.header.segment.map(|s| s.offset), Some(0));
    assert_eq!(first.header.framing, FramingInfo::First);
    assert_eq!(first.payload.len(), 40);
    assert_eq!(tx.pdu_state(sn(0)), Some(PduState::Retransmitting));

    let second = AmdPdu::decode(tx.notify_tx_opportunity(100, 2, ms(2)).expect("segment"))
        .expect("decodes");
    assert_eq!(
        second.header.segment,
        Some(SegmentInfo {
            offset: 40,
            last: true
        })
    );
    assert_eq!(second.header.framing, FramingInfo::Last);
    assert_eq!(second.payload.len(), 60);
    assert_eq!(tx.pdu_state(sn(0)), Some(PduState::Sent));
    // a single retransmission round, however many segments it took
    assert_eq!(tx.retx_count(sn(0)), Some(1));
}

#[test]
fn max_retx_escalates_exactly_once() {
    let (mut tx, log) = entity(RlcAmConfig {
        max_retx_threshold: 2,
        ..RlcAmConfig::default()
    });
    tx.transmit_pdcp_pdu(Bytes::from_static(b"doomed"), SimTime::ZERO)
        .expect("fits");
    let first = AmdPdu::decode(tx.notify_tx_opportunity(100, 0, SimTime::ZERO).expect("pdu"))
        .expect("decodes");
    assert!(first.header.poll);

    let mut now = SimTime::ZERO;
    for round in 1..=2u32 {
        now = now.saturating_add(ms(20));
        assert!(fire(&mut tx, TimerKind::PollRetransmit, now));
        assert_eq!(tx.retx_count(sn(0)), Some(round));
        let retx = AmdPdu::decode(tx.notify_tx_opportunity(100, round as u8, now).expect("retx"))
            .expect("decodes");
        assert_eq!(retx.header.sn, sn(0));
        assert!(retx.header.poll);
    }
    assert!(log.borrow().max_retx.is_empty());

    now = now.saturating_add(ms(20));
    assert!(fire(&mut tx, TimerKind::PollRetransmit, now));
    assert_eq!(log.borrow().max_retx, vec![sn(0)]);
    assert_eq!(tx.stats().max_retx_reached, 1);
    assert_eq!(tx.stats().retx_pdus, 2);
    assert_eq!(tx.vt_a(), sn(1));
    assert_eq!(tx.pdu_state(sn(0)), None);

    assert!(tx.notify_tx_opportunity(100, 3, now).is_none());
    assert!(!tx.timers().is_running(TimerKind::PollRetransmit));
    assert_eq!(log.borrow().max_retx.len(), 1);
}

#[test]
fn poll_retransmit_falls_back_to_oldest_pdu_after_escalation() {
    let (mut tx, log) = entity(RlcAmConfig {
        max_retx_threshold: 1,
        ..RlcAmConfig::default()
    });
    tx.transmit_pdcp_pdu(Bytes::from_static(b"first"), SimTime::ZERO)
        .expect("fits");
    tx.notify_tx_opportunity(100, 0, SimTime::ZERO).expect("sn 0");
    tx.transmit_pdcp_pdu(Bytes::from_static(b"second"), ms(1))
        .expect("fits");
    tx.notify_tx_opportunity(100, 1, ms(1)).expect("sn 1");
    assert_eq!(tx.vt_s(), sn(2));

    // first expiry: the newest PDU carries the poll
    assert!(fire(&mut tx, TimerKind::PollRetransmit, ms(50)));
    assert_eq!(tx.retx_count(sn(1)), Some(1));
    let retx = AmdPdu::decode(tx.notify_tx_opportunity(100, 2, ms(50)).expect("retx"))
        .expect("decodes");
    assert_eq!(retx.header.sn, sn(1));
    assert!(retx.header.poll);

    // second expiry: SN 1 is abandoned and SN 0 takes over the poll
    assert!(fire(&mut tx, TimerKind::PollRetransmit, ms(100)));
    assert_eq!(log.borrow().max_retx, vec![sn(1)]);
    assert_eq!(tx.pdu_state(sn(0)), Some(PduState::RetxPending));
    assert_eq!(tx.retx_count(sn(0)), Some(1));
    let retx = AmdPdu::decode(tx.notify_tx_opportunity(100, 3, ms(100)).expect("retx"))
        .expect("decodes");
    assert_eq!(retx.header.sn, sn(0));
    assert!(retx.header.poll);
    assert!(tx.timers().is_running(TimerKind::PollRetransmit));

    assert!(fire(&mut tx, TimerKind::PollRetransmit, ms(150)));
    assert_eq!(log.borrow().max_retx, vec![sn(1), sn(0)]);
    assert_eq!(tx.stats().max_retx_reached, 2);
    assert_eq!(tx.vt_a(), sn(2));
    assert!(tx.forwarding_sdus().is_empty());
    assert!(!tx.timers().is_running(TimerKind::PollRetransmit));
}

#[test]
fn lost_pdu_between_whole_sdus_counts_one_discard() {
    let (mut rx, log) = entity(RlcAmConfig {
        reordering_timer: ms(100),
        ..RlcAmConfig::default()
    });
    rx.receive_pdu(data_pdu(0, FramingInfo::Full, vec![], b"zero", false), ms(1))
        .expect("valid");
    // SN 1 never arrives
    rx.receive_pdu(data_pdu(2, FramingInfo::Full, vec![], b"two", false), ms(2))
        .expect("valid");
    assert_eq!(log.borrow().delivered.len(), 1);

    assert!(fire(&mut rx, TimerKind::Reordering, ms(102)));
    assert_eq!(rx.stats().rx_pdus_lost, 1);
    assert_eq!(rx.stats().rx_sdus_discarded, 1);
    assert_eq!(rx.stats().rx_sdus_delivered, 2);
    assert_eq!(log.borrow().delivered.last(), Some(&Bytes::from_static(b"two")));
    assert_eq!(rx.vr_r(), sn(3));
}

#[test]
fn harq_failure_queues_the_pdu_for_retransmission() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    tx.transmit_pdcp_pdu(Bytes::from_static(b"payload"), SimTime::ZERO)
        .expect("fits");
    let sent = tx.notify_tx_opportunity(100, 3, SimTime::ZERO).expect("pdu");

    tx.notify_harq_delivery_failure(5, ms(1));
    assert_eq!(tx.stats().harq_failures, 0);

    tx.notify_harq_delivery_failure(3, ms(1));
    assert_eq!(tx.stats().harq_failures, 1);
    assert_eq!(tx.pdu_state(sn(0)), Some(PduState::RetxPending));
    assert_eq!(tx.retx_count(sn(0)), Some(1));
    assert!(tx.buffer_status(ms(1)).retx_queue_bytes > 0);

    let again = tx.notify_tx_opportunity(100, 4, ms(2)).expect("retx");
    assert_eq!(again, sent);
    assert_eq!(tx.buffer_status(ms(2)).retx_queue_bytes, 0);
}

#[test]
fn buffer_status_reports_queue_and_status_bytes() {
    let (mut tx, log) = entity(RlcAmConfig::default());
    tx.transmit_pdcp_pdu(Bytes::from(vec![0u8; 100]), ms(1))
        .expect("fits");
    tx.transmit_pdcp_pdu(Bytes::from(vec![0u8; 50]), ms(2))
        .expect("fits");
    let bsr = log.borrow().last_buffer_status;
    assert_eq!(bsr.tx_queue_bytes, 150 + 2 * 2);
    assert_eq!(bsr.tx_queue_hol_delay, ms(1));
    assert_eq!(bsr.retx_queue_bytes, 0);
    assert_eq!(bsr.status_pdu_bytes, 0);
    assert!(tx.timers().is_running(TimerKind::Rbs));

    let reports = log.borrow().buffer_reports;
    assert!(fire(&mut tx, TimerKind::Rbs, ms(11)));
    assert_eq!(log.borrow().buffer_reports, reports + 1);
}

#[test]
fn forwarding_buffer_holds_every_unacknowledged_sdu() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    for fill in 0..3u8 {
        tx.transmit_pdcp_pdu(Bytes::from(vec![fill; 100]), SimTime::ZERO)
            .expect("fits");
    }
    // SDU 0 whole plus the first 46 bytes of SDU 1
    let pdu = AmdPdu::decode(tx.notify_tx_opportunity(150, 0, SimTime::ZERO).expect("pdu"))
        .expect("decodes");
    assert_eq!(pdu.header.length_indicators, vec![100]);
    assert_eq!(pdu.payload.len(), 146);
    assert_eq!(tx.forwarding_sdus().len(), 3);

    tx.receive_pdu(status(1, vec![]), ms(1)).expect("valid");
    let left = tx.forwarding_sdus();
    assert_eq!(left, vec![Bytes::from(vec![1u8; 100]), Bytes::from(vec![2u8; 100])]);
}

#[test]
fn malformed_pdus_are_counted_and_rejected() {
    let (mut rx, _) = entity(RlcAmConfig::default());
    let err = rx
        .receive_pdu(Bytes::from_static(&[0x80]), ms(1))
        .expect_err("truncated");
    assert!(matches!(err, RlcError::Malformed(_)));
    assert!(rx.receive_pdu(Bytes::new(), ms(1)).is_err());
    assert_eq!(rx.stats().rx_malformed, 2);
    assert!(!rx.status_pending());
}

#[test]
fn stale_timer_fires_are_ignored() {
    let (mut rx, _) = entity(RlcAmConfig::default());
    rx.receive_pdu(data_pdu(1, FramingInfo::Full, vec![], b"b", false), ms(1))
        .expect("valid");
    let stale = rx.timers().generation(TimerKind::Reordering);
    // filling the hole stops the timer
    rx.receive_pdu(data_pdu(0, FramingInfo::Full, vec![], b"a", false), ms(2))
        .expect("valid");
    assert!(!rx.expire_timer(TimerKind::Reordering, stale, ms(11)));
    assert_eq!(rx.stats().rx_pdus_lost, 0);
    assert_eq!(rx.vr_r(), sn(2));
}

#[test]
fn dispose_cancels_timers_and_rejects_later_calls() {
    let (mut tx, _) = entity(RlcAmConfig::default());
    tx.transmit_pdcp_pdu(Bytes::from_static(b"data"), SimTime::ZERO)
        .expect("fits");
    tx.notify_tx_opportunity(100, 0, SimTime::ZERO).expect("pdu");
    let poll_generation = tx.timers().generation(TimerKind::PollRetransmit);
    assert!(tx.timers().is_running(TimerKind::PollRetransmit));

    tx.dispose();
    assert!(tx.is_disposed());
    assert_eq!(tx.timers().next_deadline(), None);
    assert!(tx.take_timer_requests().is_empty());
    assert!(!tx.expire_timer(TimerKind::PollRetransmit, poll_generation, ms(20)));
    assert_eq!(
        tx.transmit_pdcp_pdu(Bytes::from_static(b"late"), ms(1)),
        Err(RlcError::Disposed)
    );
    assert!(tx.notify_tx_opportunity(100, 1, ms(1)).is_none());
    assert!(tx.forwarding_sdus().is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let err = RlcAm::new(RlcAmConfig {
        window_size: 600,
        ..RlcAmConfig::default()
    })
    .expect_err("window too large");
    assert!(matches!(err, RlcError::InvalidConfig(_)));

    let config: RlcAmConfig =
        serde_json::from_str(r#"{"reordering_timer": 50, "max_retx_threshold": 8}"#).expect("parses");
    assert_eq!(config.reordering_timer, ms(50));
    assert_eq!(config.max_retx_threshold, 8);
    assert_eq!(config.window_size, 512);
}
