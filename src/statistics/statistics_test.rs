use std::time::UNIX_EPOCH;

use util::marshal::Marshal;

use super::*;
use crate::source_description::SourceDescription;

fn ledger() -> (RtpStatistics, SystemTime) {
    let now = UNIX_EPOCH + Duration::from_secs(1_000);
    let stats = RtpStatistics::builder()
        .with_ssrc(1)
        .with_cname("test@localhost")
        .build(now);
    (stats, now)
}

#[test]
fn test_statistics_builder_defaults() {
    let (stats, _) = ledger();

    assert_eq!(stats.ssrc(), 1);
    assert_eq!(stats.cname(), Bytes::from_static(b"test@localhost"));
    assert!(stats.is_member(1));
    assert!(!stats.is_sender(1));
    assert_eq!(stats.members(), 1);
    assert_eq!(stats.pmembers(), 1);
    assert_eq!(stats.senders(), 0);
    assert_eq!(stats.scheduled_packet_type(), RtcpPacketType::Report);
    assert_eq!(stats.rtcp_bandwidth(), RTCP_MIN_BANDWIDTH);

    let random = RtpStatistics::builder().build(UNIX_EPOCH);
    assert!(random.is_member(random.ssrc()));
    assert!(!random.cname().is_empty());
}

#[test]
fn test_statistics_builder_truncates_cname() {
    let stats = RtpStatistics::builder()
        .with_ssrc(1)
        .with_cname(vec![b'a'; SDES_MAX_OCTET_COUNT + 10])
        .build(UNIX_EPOCH);
    assert_eq!(stats.cname().len(), SDES_MAX_OCTET_COUNT);

    let sdes = SourceDescription::with_cname(stats.ssrc(), stats.cname());
    assert!(sdes.marshal().is_ok());
}

#[test]
fn test_statistics_membership() {
    let (mut stats, now) = ledger();

    assert!(stats.add_member(Some(2), now));
    assert!(!stats.add_member(Some(2), now), "second add is a no-op");
    assert_eq!(stats.members(), 2);

    // counting without a table entry
    assert!(stats.add_member(None, now));
    assert_eq!(stats.members(), 3);
    assert!(!stats.is_member(3));

    assert!(stats.remove_member(2));
    assert!(!stats.remove_member(2), "second remove is a no-op");
    assert_eq!(stats.members(), 2);

    assert!(!stats.remove_member(1), "we never leave our own table");
    assert!(stats.is_member(1));

    assert_eq!(stats.pmembers(), 1);
    stats.confirm_members();
    assert_eq!(stats.pmembers(), 2);

    stats.add_member(Some(4), now);
    stats.reset_members();
    assert_eq!(stats.members(), 1);
    assert_eq!(stats.pmembers(), 1);
    assert!(!stats.is_member(4));
    assert!(stats.is_member(1));
}

#[test]
fn test_statistics_senders() {
    let (mut stats, now) = ledger();

    assert!(!stats.add_sender(2, now), "unknown ssrc can't become a sender");

    stats.add_member(Some(2), now);
    assert!(stats.add_sender(2, now));
    assert!(!stats.add_sender(2, now));
    assert!(stats.is_sender(2));
    assert_eq!(stats.senders(), 1);

    assert!(stats.remove_sender(2));
    assert!(!stats.remove_sender(2));
    assert!(stats.is_member(2), "removing a sender keeps the member");

    stats.add_sender(2, now);
    stats.rtp_sent(1234, 160, now);
    assert!(stats.is_sender(1));
    assert_eq!(stats.senders(), 2);
    assert_eq!(stats.sender_info(), (1234, 1, 160));

    stats.clear_senders();
    assert_eq!(stats.senders(), 0);
}

#[test]
fn test_statistics_rtcp_interval_bounds() {
    let (mut stats, _) = ledger();

    // a lone receiver always hits the minimum interval
    assert_eq!(stats.deterministic_interval(true), RTCP_MIN_TIME / 2);
    assert_eq!(stats.deterministic_interval(false), RTCP_MIN_TIME);

    for _ in 0..100 {
        let t = stats.rtcp_interval(true);
        assert!(
            t >= Duration::from_millis(1_020) && t <= Duration::from_millis(3_080),
            "initial interval {t:?} out of bounds"
        );

        let t = stats.rtcp_interval(false);
        assert!(
            t >= Duration::from_millis(2_050) && t <= Duration::from_millis(6_160),
            "interval {t:?} out of bounds"
        );
    }
}

#[test]
fn test_statistics_rtcp_interval_bandwidth_split() {
    let now = UNIX_EPOCH;
    let mut stats = RtpStatistics::builder()
        .with_ssrc(1)
        .with_avg_size(1_000)
        .build(now);
    for ssrc in 2..=10 {
        stats.add_member(Some(ssrc), now);
    }
    assert_eq!(stats.members(), 10);

    // one remote sender: we share the receiver fraction with 8 other receivers
    stats.add_sender(2, now);
    assert_eq!(stats.deterministic_interval(false), Duration::from_secs(30));

    // we are the only sender: the sender fraction is ours alone
    stats.remove_sender(2);
    stats.rtp_sent(0, 100, now);
    assert_eq!(stats.deterministic_interval(false), Duration::from_secs(10));

    // senders are no longer a minority: everybody shares the whole bandwidth
    for ssrc in 2..=4 {
        stats.add_sender(ssrc, now);
    }
    assert_eq!(stats.deterministic_interval(false), Duration::from_secs(25));
}

#[test]
fn test_statistics_avg_size() {
    let (mut stats, _) = ledger();

    stats.set_avg_size(100);
    assert_eq!(stats.avg_size(), 100.0);

    stats.calculate_avg_size(200);
    assert_eq!(stats.avg_size(), 106.25);
}

#[test]
fn test_statistics_sender_timeout_check() {
    let (mut stats, t0) = ledger();
    stats.add_member(Some(2), t0);
    stats.add_sender(2, t0);
    stats.add_member(Some(3), t0);
    stats.rtp_sent(0, 10, t0);

    // deterministic interval is the 5s minimum: senders expire after 10s, members after 25s
    assert_eq!(stats.sender_timeout_check(t0 + Duration::from_secs(9)), 0);

    let t1 = t0 + Duration::from_secs(11);
    stats.touch_member(3, t1);
    assert_eq!(stats.sender_timeout_check(t1), 1);
    assert!(!stats.is_sender(2));
    assert!(stats.is_member(2));
    assert!(stats.is_sender(1), "our own sender state is not timed out");

    let t2 = t0 + Duration::from_secs(26);
    assert_eq!(stats.sender_timeout_check(t2), 1);
    assert!(!stats.is_member(2));
    assert!(stats.is_member(3));
    assert!(stats.is_member(1));
    assert_eq!(stats.members(), 2);
}

#[test]
fn test_statistics_reception_reports() {
    let (mut stats, t0) = ledger();
    stats.add_member(Some(3), t0);
    stats.add_member(Some(2), t0);
    stats.add_member(Some(4), t0);
    stats.add_sender(3, t0);
    stats.add_sender(2, t0);

    let ntp = 0x1234_5678_9abc_def0u64;
    stats.sender_report_received(3, ntp, t0);

    let reports = stats.reception_reports(t0 + Duration::from_secs(1));
    assert_eq!(reports.len(), 2, "receivers are not reported on");
    assert_eq!(reports[0].ssrc, 2);
    assert_eq!(reports[0].last_sender_report, 0);
    assert_eq!(reports[0].delay, 0);
    assert_eq!(reports[1].ssrc, 3);
    assert_eq!(reports[1].last_sender_report, 0x5678_9abc);
    assert_eq!(reports[1].delay, 65536);

    let member = stats.member(3).expect("member");
    assert_eq!(member.last_sr, Some((0x5678_9abc, t0)));
}
