mod member;
#[cfg(test)]
mod statistics_test;

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use rand::Rng;

pub use member::Member;

use crate::compound_packet::RtcpPacketType;
use crate::header::{COUNT_MAX, SDES_MAX_OCTET_COUNT};
use crate::reception_report::ReceptionReport;

/// Minimum average time between RTCP packets, halved for the first report.
pub const RTCP_MIN_TIME: Duration = Duration::from_secs(5);
/// Fraction of the session bandwidth given to RTCP.
pub const RTCP_BANDWIDTH_FRACTION: f64 = 0.05;
/// Share of the RTCP bandwidth used by active senders.
pub const RTCP_SENDER_BANDWIDTH_FRACTION: f64 = 0.25;
pub const RTCP_RECEIVER_BANDWIDTH_FRACTION: f64 = 1.0 - RTCP_SENDER_BANDWIDTH_FRACTION;
/// Lowest RTCP bandwidth, in octets per second, the interval is computed with.
pub const RTCP_MIN_BANDWIDTH: f64 = 400.0;
// e - 3/2, compensates the randomization for timer reconsideration
const COMPENSATION: f64 = std::f64::consts::E - 1.5;
/// Number of deterministic intervals a member may stay silent before it times out.
pub const MEMBER_TIMEOUT_INTERVALS: u32 = 5;
/// Number of deterministic intervals a sender may stop sending RTP before it becomes a receiver.
pub const SENDER_TIMEOUT_INTERVALS: u32 = 2;

const DEFAULT_SESSION_BANDWIDTH: u64 = 64_000;
const DEFAULT_AVG_RTCP_SIZE: f64 = 128.0;

/// Statistics is the membership and bandwidth ledger of an RTP session, as
/// used by the RTCP scheduler to decide when to transmit.
pub trait Statistics: Send {
    /// ssrc is our own synchronization source.
    fn ssrc(&self) -> u32;
    /// cname is our own canonical name.
    fn cname(&self) -> Bytes;

    fn is_member(&self, ssrc: u32) -> bool;
    /// add_member inserts ssrc in the member table and bumps the member count.
    /// With no ssrc only the count grows, which is how BYEs are counted while leaving.
    fn add_member(&mut self, ssrc: Option<u32>, now: SystemTime) -> bool;
    fn remove_member(&mut self, ssrc: u32) -> bool;
    /// touch_member records activity from a known member.
    fn touch_member(&mut self, ssrc: u32, now: SystemTime);

    fn is_sender(&self, ssrc: u32) -> bool;
    fn add_sender(&mut self, ssrc: u32, now: SystemTime) -> bool;
    fn remove_sender(&mut self, ssrc: u32) -> bool;

    fn members(&self) -> usize;
    fn pmembers(&self) -> usize;
    fn senders(&self) -> usize;
    /// confirm_members commits pmembers = members.
    fn confirm_members(&mut self);
    /// reset_members forgets everybody but ourselves.
    fn reset_members(&mut self);
    fn clear_senders(&mut self);

    /// rtcp_interval draws a randomized transmission interval.
    fn rtcp_interval(&mut self, initial: bool) -> Duration;
    fn avg_size(&self) -> f64;
    /// calculate_avg_size folds the size of a sent or received compound packet into the average.
    fn calculate_avg_size(&mut self, size: usize);
    fn set_avg_size(&mut self, size: usize);

    fn scheduled_packet_type(&self) -> RtcpPacketType;
    fn set_scheduled_packet_type(&mut self, packet_type: RtcpPacketType);

    /// sender_timeout_check demotes silent senders and drops silent members.
    /// It returns how many entries changed.
    fn sender_timeout_check(&mut self, now: SystemTime) -> usize;

    /// rtp_sent accounts for an RTP packet we sent.
    fn rtp_sent(&mut self, rtp_timestamp: u32, payload_len: usize, now: SystemTime);
    /// sender_report_received remembers the NTP time of an SR, for LSR/DLSR.
    fn sender_report_received(&mut self, ssrc: u32, ntp_time: u64, now: SystemTime);
    /// sender_info returns the last RTP timestamp, packet count and octet count we sent.
    fn sender_info(&self) -> (u32, u32, u32);
    /// reception_reports builds one report block per remote sender.
    fn reception_reports(&self, now: SystemTime) -> Vec<ReceptionReport>;
}

/// StatisticsBuilder configures an RtpStatistics ledger.
#[derive(Default)]
pub struct StatisticsBuilder {
    ssrc: Option<u32>,
    cname: Option<Bytes>,
    session_bandwidth: Option<u64>,
    avg_size: Option<usize>,
}

impl StatisticsBuilder {
    /// with_ssrc sets our own synchronization source, random by default.
    pub fn with_ssrc(mut self, ssrc: u32) -> StatisticsBuilder {
        self.ssrc = Some(ssrc);
        self
    }

    /// with_cname sets the canonical name announced in SDES. A name longer than
    /// an SDES item can carry is truncated.
    pub fn with_cname(mut self, cname: impl Into<Bytes>) -> StatisticsBuilder {
        self.cname = Some(cname.into());
        self
    }

    /// with_session_bandwidth sets the session bandwidth in bits per second.
    pub fn with_session_bandwidth(mut self, bits_per_second: u64) -> StatisticsBuilder {
        self.session_bandwidth = Some(bits_per_second);
        self
    }

    /// with_avg_size sets the initial average compound packet size.
    pub fn with_avg_size(mut self, size: usize) -> StatisticsBuilder {
        self.avg_size = Some(size);
        self
    }

    pub fn build(self, now: SystemTime) -> RtpStatistics {
        let ssrc = self.ssrc.unwrap_or_else(rand::random::<u32>);
        let mut cname = self
            .cname
            .unwrap_or_else(|| Bytes::from(format!("{ssrc:08x}@rtcp-session")));
        if cname.len() > SDES_MAX_OCTET_COUNT {
            log::warn!(
                "CNAME of {} octets truncated to {}",
                cname.len(),
                SDES_MAX_OCTET_COUNT
            );
            cname.truncate(SDES_MAX_OCTET_COUNT);
        }

        let mut table = HashMap::new();
        table.insert(ssrc, Member::new(ssrc, now));

        RtpStatistics {
            ssrc,
            cname,
            session_bandwidth: self.session_bandwidth.unwrap_or(DEFAULT_SESSION_BANDWIDTH),
            table,
            members: 1,
            pmembers: 1,
            avg_size: self
                .avg_size
                .map(|s| s as f64)
                .unwrap_or(DEFAULT_AVG_RTCP_SIZE),
            scheduled_packet_type: RtcpPacketType::Report,
            rtp_time: 0,
            packet_count: 0,
            octet_count: 0,
        }
    }
}

/// RtpStatistics is the in-memory ledger of an RTP session.
#[derive(Debug)]
pub struct RtpStatistics {
    ssrc: u32,
    cname: Bytes,
    session_bandwidth: u64,

    table: HashMap<u32, Member>,
    members: usize,
    pmembers: usize,

    avg_size: f64,
    scheduled_packet_type: RtcpPacketType,

    rtp_time: u32,
    packet_count: u32,
    octet_count: u32,
}

impl RtpStatistics {
    pub fn builder() -> StatisticsBuilder {
        StatisticsBuilder::default()
    }

    /// member returns the table entry for ssrc.
    pub fn member(&self, ssrc: u32) -> Option<&Member> {
        self.table.get(&ssrc)
    }

    /// rtcp_bandwidth is the bandwidth, in octets per second, RTCP may use.
    pub fn rtcp_bandwidth(&self) -> f64 {
        let bw = self.session_bandwidth as f64 * RTCP_BANDWIDTH_FRACTION / 8.0;
        bw.max(RTCP_MIN_BANDWIDTH)
    }

    /// deterministic_interval is the calculated interval before randomization.
    pub fn deterministic_interval(&self, initial: bool) -> Duration {
        let min_time = if initial {
            RTCP_MIN_TIME / 2
        } else {
            RTCP_MIN_TIME
        };

        let members = self.members as f64;
        let senders = self.senders() as f64;
        let mut n = members;
        let mut rtcp_bw = self.rtcp_bandwidth();

        // senders get their own share only while they are a minority
        if senders <= members * RTCP_SENDER_BANDWIDTH_FRACTION {
            if self.is_sender(self.ssrc) {
                rtcp_bw *= RTCP_SENDER_BANDWIDTH_FRACTION;
                n = senders;
            } else {
                rtcp_bw *= RTCP_RECEIVER_BANDWIDTH_FRACTION;
                n -= senders;
            }
        }

        let t = Duration::from_secs_f64(self.avg_size * n / rtcp_bw);
        t.max(min_time)
    }
}

impl Statistics for RtpStatistics {
    fn ssrc(&self) -> u32 {
        self.ssrc
    }

    fn cname(&self) -> Bytes {
        self.cname.clone()
    }

    fn is_member(&self, ssrc: u32) -> bool {
        self.table.contains_key(&ssrc)
    }

    fn add_member(&mut self, ssrc: Option<u32>, now: SystemTime) -> bool {
        match ssrc {
            Some(ssrc) => {
                if self.table.contains_key(&ssrc) {
                    return false;
                }
                self.table.insert(ssrc, Member::new(ssrc, now));
                self.members += 1;
                true
            }
            None => {
                self.members += 1;
                true
            }
        }
    }

    fn remove_member(&mut self, ssrc: u32) -> bool {
        if ssrc == self.ssrc || self.table.remove(&ssrc).is_none() {
            return false;
        }
        self.members = self.members.saturating_sub(1).max(1);
        true
    }

    fn touch_member(&mut self, ssrc: u32, now: SystemTime) {
        if let Some(m) = self.table.get_mut(&ssrc) {
            m.touch(now);
        }
    }

    fn is_sender(&self, ssrc: u32) -> bool {
        self.table.get(&ssrc).map(|m| m.is_sender()).unwrap_or(false)
    }

    fn add_sender(&mut self, ssrc: u32, now: SystemTime) -> bool {
        match self.table.get_mut(&ssrc) {
            Some(m) => {
                let was_sender = m.is_sender();
                m.last_rtp = Some(now);
                m.touch(now);
                !was_sender
            }
            None => false,
        }
    }

    fn remove_sender(&mut self, ssrc: u32) -> bool {
        match self.table.get_mut(&ssrc) {
            Some(m) => m.last_rtp.take().is_some(),
            None => false,
        }
    }

    fn members(&self) -> usize {
        self.members
    }

    fn pmembers(&self) -> usize {
        self.pmembers
    }

    fn senders(&self) -> usize {
        self.table.values().filter(|m| m.is_sender()).count()
    }

    fn confirm_members(&mut self) {
        self.pmembers = self.members;
    }

    fn reset_members(&mut self) {
        let own = self.ssrc;
        self.table.retain(|ssrc, _| *ssrc == own);
        self.members = 1;
        self.pmembers = 1;
    }

    fn clear_senders(&mut self) {
        for m in self.table.values_mut() {
            m.last_rtp = None;
        }
    }

    fn rtcp_interval(&mut self, initial: bool) -> Duration {
        let td = self.deterministic_interval(initial);
        let factor: f64 = rand::rng().random_range(0.5..1.5);
        td.mul_f64(factor / COMPENSATION)
    }

    fn avg_size(&self) -> f64 {
        self.avg_size
    }

    fn calculate_avg_size(&mut self, size: usize) {
        self.avg_size = (1.0 / 16.0) * size as f64 + (15.0 / 16.0) * self.avg_size;
    }

    fn set_avg_size(&mut self, size: usize) {
        self.avg_size = size as f64;
    }

    fn scheduled_packet_type(&self) -> RtcpPacketType {
        self.scheduled_packet_type
    }

    fn set_scheduled_packet_type(&mut self, packet_type: RtcpPacketType) {
        self.scheduled_packet_type = packet_type;
    }

    fn sender_timeout_check(&mut self, now: SystemTime) -> usize {
        let td = self.deterministic_interval(false);
        let sender_timeout = td * SENDER_TIMEOUT_INTERVALS;
        let member_timeout = td * MEMBER_TIMEOUT_INTERVALS;
        let own = self.ssrc;

        let mut changed = 0;
        for m in self.table.values_mut().filter(|m| m.ssrc != own) {
            if let Some(silent) = m.rtp_silent_for(now) {
                if silent > sender_timeout {
                    log::debug!("sender {} timed out after {:?}", m.ssrc, silent);
                    m.last_rtp = None;
                    changed += 1;
                }
            }
        }

        let before = self.table.len();
        self.table.retain(|ssrc, m| {
            let keep = *ssrc == own || m.silent_for(now) <= member_timeout;
            if !keep {
                log::debug!("member {ssrc} timed out");
            }
            keep
        });
        let removed = before - self.table.len();
        self.members = self.members.saturating_sub(removed).max(1);

        changed + removed
    }

    fn rtp_sent(&mut self, rtp_timestamp: u32, payload_len: usize, now: SystemTime) {
        self.rtp_time = rtp_timestamp;
        self.packet_count = self.packet_count.wrapping_add(1);
        self.octet_count = self.octet_count.wrapping_add(payload_len as u32);
        let own = self.ssrc;
        self.add_sender(own, now);
    }

    fn sender_report_received(&mut self, ssrc: u32, ntp_time: u64, now: SystemTime) {
        if let Some(m) = self.table.get_mut(&ssrc) {
            m.last_sr = Some((crate::util::compact_ntp(ntp_time), now));
            m.touch(now);
        }
    }

    fn sender_info(&self) -> (u32, u32, u32) {
        (self.rtp_time, self.packet_count, self.octet_count)
    }

    fn reception_reports(&self, now: SystemTime) -> Vec<ReceptionReport> {
        let mut senders: Vec<&Member> = self
            .table
            .values()
            .filter(|m| m.ssrc != self.ssrc && m.is_sender())
            .collect();
        senders.sort_by_key(|m| m.ssrc);

        senders
            .into_iter()
            .take(COUNT_MAX)
            .map(|m| m.reception_report(now))
            .collect()
    }
}
