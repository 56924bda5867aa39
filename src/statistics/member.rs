use std::time::{Duration, SystemTime};

use crate::reception_report::ReceptionReport;
use crate::util::duration_to_dlsr;

/// Member is one entry of the member table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub ssrc: u32,
    /// Last time any packet, RTP or RTCP, was seen from this member.
    pub last_activity: SystemTime,
    /// Set while the member is an active sender.
    pub last_rtp: Option<SystemTime>,
    /// Compact NTP time of the last SR received from this member, and when it arrived.
    pub last_sr: Option<(u32, SystemTime)>,
}

impl Member {
    pub(crate) fn new(ssrc: u32, now: SystemTime) -> Self {
        Member {
            ssrc,
            last_activity: now,
            last_rtp: None,
            last_sr: None,
        }
    }

    pub fn is_sender(&self) -> bool {
        self.last_rtp.is_some()
    }

    pub(crate) fn touch(&mut self, now: SystemTime) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub(crate) fn silent_for(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_activity).unwrap_or_default()
    }

    pub(crate) fn rtp_silent_for(&self, now: SystemTime) -> Option<Duration> {
        self.last_rtp
            .map(|last| now.duration_since(last).unwrap_or_default())
    }

    /// reception_report builds the block we send about this member.
    pub(crate) fn reception_report(&self, now: SystemTime) -> ReceptionReport {
        let (last_sender_report, delay) = match self.last_sr {
            Some((lsr, arrived)) => (
                lsr,
                duration_to_dlsr(now.duration_since(arrived).unwrap_or_default()),
            ),
            None => (0, 0),
        };

        ReceptionReport {
            ssrc: self.ssrc,
            last_sender_report,
            delay,
            ..Default::default()
        }
    }
}
