use crate::rlc::sn::{SN_MODULUS, SequenceNumber};

fn sn(v: u16) -> SequenceNumber {
    SequenceNumber::new(v)
}

#[test]
fn values_are_reduced_modulo_1024() {
    assert_eq!(SN_MODULUS, 1024);
    assert_eq!(sn(1024), sn(0));
    assert_eq!(sn(1030).value(), 6);
    assert_eq!(sn(1023).next(), sn(0));
    assert_eq!(sn(0).prev(), sn(1023));
    assert_eq!(sn(1000) + 100, sn(76));
    assert_eq!(sn(10) - 20, sn(1014));
}

#[test]
fn distance_wraps_around() {
    assert_eq!(SequenceNumber::distance(sn(1020), sn(4)), 8);
    assert_eq!(SequenceNumber::distance(sn(4), sn(1020)), 1016);
    assert_eq!(SequenceNumber::distance(sn(7), sn(7)), 0);
    assert_eq!(sn(3).offset_from(sn(1023)), 4);
}

#[test]
fn window_membership_is_relative_to_base() {
    let base = sn(1000);
    assert!(sn(1000).in_window(base, 512));
    assert!(sn(0).in_window(base, 512));
    assert!(sn(487).in_window(base, 512));
    assert!(!sn(488).in_window(base, 512));
    assert!(!sn(999).in_window(base, 512));
}
