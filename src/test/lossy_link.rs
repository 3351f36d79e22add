use crate::demo::{LinkOpts, build_radio_link, schedule_bulk_transfer, sdu_payload};
use crate::net::{EndpointId, NetWorld};
use crate::rlc::RlcAmConfig;
use crate::sim::{SimTime, Simulator};

fn config() -> RlcAmConfig {
    RlcAmConfig {
        max_tx_buffer_size: 100_000,
        reordering_timer: SimTime::from_millis(300),
        ..RlcAmConfig::default()
    }
}

fn run(opts: &LinkOpts) -> (NetWorld, EndpointId, EndpointId) {
    run_with(opts, &config())
}

fn run_with(opts: &LinkOpts, config: &RlcAmConfig) -> (NetWorld, EndpointId, EndpointId) {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let (ue, enb) = build_radio_link(&mut world, opts, config).expect("valid link");
    schedule_bulk_transfer(&mut sim, opts, ue, enb);
    sim.run_until(opts.until, &mut world);
    (world, ue, enb)
}

fn assert_exactly_once_in_order(world: &NetWorld, tx: EndpointId, rx: EndpointId, opts: &LinkOpts) {
    let receiver = world.link.endpoint(rx).expect("receiver");
    let expected: Vec<u16> = (0..opts.sdus as u16).collect();
    assert_eq!(receiver.log().delivered_pdcp_sns(), expected);
    for (i, sdu) in receiver.log().delivered.iter().enumerate() {
        assert_eq!(sdu.slice(2..), sdu_payload(i as u64, opts.sdu_bytes));
    }
    let sender = world.link.endpoint(tx).expect("sender");
    assert!(sender.log().max_retx.is_empty());
    assert_eq!(sender.rejected_sdus, 0);
    assert_eq!(sender.rlc.vt_a(), sender.rlc.vt_s());
}

#[test]
fn clean_link_delivers_every_sdu() {
    let opts = LinkOpts {
        sdus: 100,
        until: SimTime::from_millis(500),
        ..LinkOpts::default()
    };
    let (world, ue, enb) = run(&opts);
    assert_exactly_once_in_order(&world, ue, enb, &opts);

    let tx = world.link.rlc_stats(ue).expect("sender");
    assert_eq!(tx.retx_pdus, 0);
    assert!(tx.polls_sent > 0);
    let rx = world.link.rlc_stats(enb).expect("receiver");
    assert_eq!(rx.rx_sdus_delivered, 100);
    assert_eq!(rx.rx_pdus_lost, 0);
    assert!(rx.status_pdus_sent > 0);
}

#[test]
fn dropped_pdus_are_repaired_by_arq() {
    let opts = LinkOpts {
        sdus: 100,
        drop_every: 7,
        until: SimTime::from_secs(1),
        ..LinkOpts::default()
    };
    let (world, ue, enb) = run(&opts);
    assert_exactly_once_in_order(&world, ue, enb, &opts);

    let channel = world.link.channel(ue, enb).expect("data channel");
    assert!(channel.stats.dropped > 0);
    // the STATUS direction is clean
    assert_eq!(world.link.channel(enb, ue).expect("status channel").stats.dropped, 0);
    assert!(world.link.rlc_stats(ue).expect("sender").retx_pdus > 0);
    assert_eq!(world.link.rlc_stats(enb).expect("receiver").rx_pdus_lost, 0);
}

#[test]
fn harq_failures_are_retransmitted() {
    let opts = LinkOpts {
        sdus: 100,
        harq_fail_every: 5,
        until: SimTime::from_secs(1),
        ..LinkOpts::default()
    };
    let (world, ue, enb) = run(&opts);
    assert_exactly_once_in_order(&world, ue, enb, &opts);

    let tx = world.link.rlc_stats(ue).expect("sender");
    assert!(tx.harq_failures > 0);
    assert!(tx.retx_pdus > 0);
}

#[test]
fn sequence_numbers_wrap_under_loss() {
    let opts = LinkOpts {
        sdus: 3_000,
        drop_every: 7,
        harq_fail_every: 11,
        until: SimTime::from_secs(5),
        ..LinkOpts::default()
    };
    let config = RlcAmConfig {
        max_retx_threshold: 8,
        ..config()
    };
    let (world, ue, enb) = run_with(&opts, &config);
    assert_exactly_once_in_order(&world, ue, enb, &opts);

    let tx = world.link.rlc_stats(ue).expect("sender");
    // VT(S) wrapped past 1023 at least once
    assert!(tx.tx_pdus > 1024, "only {} PDUs sent", tx.tx_pdus);
    assert!(tx.retx_pdus > 0);
    assert!(tx.harq_failures > 0);
    assert!(world.link.channel(ue, enb).expect("data channel").stats.dropped > 0);
    let rx = world.link.rlc_stats(enb).expect("receiver");
    assert_eq!(rx.rx_sdus_delivered, 3_000);
    assert_eq!(rx.rx_sdus_discarded, 0);
}
