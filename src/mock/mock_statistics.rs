use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use bytes::Bytes;

use crate::compound_packet::RtcpPacketType;
use crate::reception_report::ReceptionReport;
use crate::statistics::{RtpStatistics, Statistics};

/// MockStatistics is an RtpStatistics whose rtcp_interval draws are scripted.
/// Once the script runs out, intervals are drawn from the wrapped ledger.
pub struct MockStatistics {
    inner: RtpStatistics,
    intervals: VecDeque<Duration>,
}

impl MockStatistics {
    pub fn new(inner: RtpStatistics) -> Self {
        MockStatistics {
            inner,
            intervals: VecDeque::new(),
        }
    }

    /// with_intervals queues the values the next rtcp_interval calls return, in order.
    pub fn with_intervals(mut self, intervals: impl IntoIterator<Item = Duration>) -> Self {
        self.intervals.extend(intervals);
        self
    }
}

impl Statistics for MockStatistics {
    fn ssrc(&self) -> u32 {
        self.inner.ssrc()
    }

    fn cname(&self) -> Bytes {
        self.inner.cname()
    }

    fn is_member(&self, ssrc: u32) -> bool {
        self.inner.is_member(ssrc)
    }

    fn add_member(&mut self, ssrc: Option<u32>, now: SystemTime) -> bool {
        self.inner.add_member(ssrc, now)
    }

    fn remove_member(&mut self, ssrc: u32) -> bool {
        self.inner.remove_member(ssrc)
    }

    fn touch_member(&mut self, ssrc: u32, now: SystemTime) {
        self.inner.touch_member(ssrc, now)
    }

    fn is_sender(&self, ssrc: u32) -> bool {
        self.inner.is_sender(ssrc)
    }

    fn add_sender(&mut self, ssrc: u32, now: SystemTime) -> bool {
        self.inner.add_sender(ssrc, now)
    }

    fn remove_sender(&mut self, ssrc: u32) -> bool {
        self.inner.remove_sender(ssrc)
    }

    fn members(&self) -> usize {
        self.inner.members()
    }

    fn pmembers(&self) -> usize {
        self.inner.pmembers()
    }

    fn senders(&self) -> usize {
        self.inner.senders()
    }

    fn confirm_members(&mut self) {
        self.inner.confirm_members()
    }

    fn reset_members(&mut self) {
        self.inner.reset_members()
    }

    fn clear_senders(&mut self) {
        self.inner.clear_senders()
    }

    fn rtcp_interval(&mut self, initial: bool) -> Duration {
        match self.intervals.pop_front() {
            Some(t) => t,
            None => self.inner.rtcp_interval(initial),
        }
    }

    fn avg_size(&self) -> f64 {
        self.inner.avg_size()
    }

    fn calculate_avg_size(&mut self, size: usize) {
        self.inner.calculate_avg_size(size)
    }

    fn set_avg_size(&mut self, size: usize) {
        self.inner.set_avg_size(size)
    }

    fn scheduled_packet_type(&self) -> RtcpPacketType {
        self.inner.scheduled_packet_type()
    }

    fn set_scheduled_packet_type(&mut self, packet_type: RtcpPacketType) {
        self.inner.set_scheduled_packet_type(packet_type)
    }

    fn sender_timeout_check(&mut self, now: SystemTime) -> usize {
        self.inner.sender_timeout_check(now)
    }

    fn rtp_sent(&mut self, rtp_timestamp: u32, payload_len: usize, now: SystemTime) {
        self.inner.rtp_sent(rtp_timestamp, payload_len, now)
    }

    fn sender_report_received(&mut self, ssrc: u32, ntp_time: u64, now: SystemTime) {
        self.inner.sender_report_received(ssrc, ntp_time, now)
    }

    fn sender_info(&self) -> (u32, u32, u32) {
        self.inner.sender_info()
    }

    fn reception_reports(&self, now: SystemTime) -> Vec<ReceptionReport> {
        self.inner.reception_reports(now)
    }
}
