use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use util::marshal::Unmarshal;

use super::FnTimeGen;
use crate::compound_packet::{Report, RtcpPacket, RtcpPacketType};
use crate::error::{Error, Result};
use crate::goodbye::Goodbye;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::statistics::{Statistics, SENDER_TIMEOUT_INTERVALS};
use crate::transport::Transport;
use crate::util::unix2ntp;

/// Initial capacity of the transmit buffer; it grows if a compound packet needs more.
pub(crate) const TX_BUFFER_SIZE: usize = 1500;

/// ScheduledKind is the kind of packet the session is waiting to transmit.
/// It decides how received reports and BYEs affect the member table.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScheduledKind {
    #[default]
    Report,
    Bye,
}

impl From<RtcpPacketType> for ScheduledKind {
    fn from(t: RtcpPacketType) -> Self {
        match t {
            RtcpPacketType::Report => ScheduledKind::Report,
            RtcpPacketType::Bye => ScheduledKind::Bye,
        }
    }
}

impl From<ScheduledKind> for RtcpPacketType {
    fn from(k: ScheduledKind) -> Self {
        match k {
            ScheduledKind::Report => RtcpPacketType::Report,
            ScheduledKind::Bye => RtcpPacketType::Bye,
        }
    }
}

/// SessionStatus tracks where a session is in its lifetime.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    Joined,
    /// A BYE is scheduled.
    Leaving,
    /// The BYE went out; nothing is scheduled anymore.
    Left,
    Closed,
}

pub(crate) struct ScheduledTask {
    pub(crate) id: u64,
    pub(crate) timestamp: SystemTime,
    pub(crate) packet: RtcpPacket,
    pub(crate) timer: JoinHandle<()>,
}

impl ScheduledTask {
    pub(crate) fn kind(&self) -> ScheduledKind {
        self.packet.packet_type().into()
    }
}

pub(crate) struct SessionState {
    pub(crate) statistics: Box<dyn Statistics>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) status: SessionStatus,

    /// last time we transmitted
    pub(crate) tp: SystemTime,
    /// next scheduled transmission
    pub(crate) tn: SystemTime,
    pub(crate) initial: bool,
    pub(crate) we_sent: bool,
    /// reports sent since our last RTP packet
    reports_since_rtp: u32,

    pub(crate) kind: ScheduledKind,
    pub(crate) scheduled: Option<ScheduledTask>,
    next_id: u64,

    tx_buffer: Vec<u8>,
}

impl SessionState {
    fn next_task_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub(crate) struct HandlerInternal {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) now: Option<FnTimeGen>,
    pub(crate) bye_reason: Bytes,
    me: Weak<HandlerInternal>,
}

// moves t towards now by members/pmembers, on either side of now
fn scale_around(now: SystemTime, t: SystemTime, members: u32, pmembers: u32) -> SystemTime {
    match t.duration_since(now) {
        Ok(ahead) => now + ahead * members / pmembers,
        Err(behind) => now
            .checked_sub(behind.duration() * members / pmembers)
            .unwrap_or(UNIX_EPOCH),
    }
}

impl HandlerInternal {
    pub(crate) fn new(
        statistics: Box<dyn Statistics>,
        transport: Option<Arc<dyn Transport>>,
        now: Option<FnTimeGen>,
        bye_reason: Bytes,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| HandlerInternal {
            state: Mutex::new(SessionState {
                statistics,
                transport,
                status: SessionStatus::Idle,
                tp: UNIX_EPOCH,
                tn: UNIX_EPOCH,
                initial: true,
                we_sent: false,
                reports_since_rtp: 0,
                kind: ScheduledKind::Report,
                scheduled: None,
                next_id: 0,
                tx_buffer: vec![0u8; TX_BUFFER_SIZE],
            }),
            now,
            bye_reason,
            me: me.clone(),
        })
    }

    pub(crate) fn now(&self) -> SystemTime {
        if let Some(f) = &self.now {
            f()
        } else {
            SystemTime::now()
        }
    }

    pub(crate) async fn status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        state.status
    }

    pub(crate) async fn join(&self) -> Result<()> {
        let now = self.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match state.status {
            SessionStatus::Idle => {}
            SessionStatus::Closed => return Err(Error::ErrSessionClosed),
            _ => return Err(Error::ErrAlreadyJoined),
        }

        state.tp = now;
        state.initial = true;
        state.statistics.reset_members();

        let packet = self.build_packet(state, ScheduledKind::Report, now);
        state.statistics.set_avg_size(packet.size());

        let t = state.statistics.rtcp_interval(state.initial);
        state.tn = now + t;
        state.status = SessionStatus::Joined;

        let tn = state.tn;
        self.schedule(state, tn, packet)?;
        log::debug!(
            "ssrc {} joined, first report in {:?}",
            state.statistics.ssrc(),
            t
        );

        Ok(())
    }

    pub(crate) async fn leave(&self) -> Result<()> {
        let now = self.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match state.status {
            SessionStatus::Joined => {}
            SessionStatus::Closed => return Err(Error::ErrSessionClosed),
            _ => return Err(Error::ErrNotJoined),
        }

        state.tp = now;
        state.statistics.reset_members();
        state.initial = true;
        state.we_sent = false;
        state.statistics.clear_senders();

        let bye = self.build_packet(state, ScheduledKind::Bye, now);
        state.statistics.set_avg_size(bye.size());

        let t = state.statistics.rtcp_interval(state.initial);
        state.tn = now + t;
        state.status = SessionStatus::Leaving;

        let tn = state.tn;
        self.schedule(state, tn, bye)?;
        log::debug!("ssrc {} leaving, BYE in {:?}", state.statistics.ssrc(), t);

        Ok(())
    }

    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.scheduled.take() {
            task.timer.abort();
        }
        state.status = SessionStatus::Closed;
    }

    pub(crate) async fn rtp_sent(&self, rtp_timestamp: u32, payload_len: usize) {
        let now = self.now();
        let mut state = self.state.lock().await;
        state.we_sent = true;
        state.reports_since_rtp = 0;
        state.statistics.rtp_sent(rtp_timestamp, payload_len, now);
    }

    pub(crate) async fn rtp_received(&self, ssrc: u32) {
        let now = self.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.kind == ScheduledKind::Report && state.statistics.add_member(Some(ssrc), now) {
            log::debug!("new member {ssrc} from RTP");
        }
        state.statistics.add_sender(ssrc, now);
    }

    /// build_packet assembles the compound packet of the given kind from the ledger.
    pub(crate) fn build_packet(
        &self,
        state: &SessionState,
        kind: ScheduledKind,
        now: SystemTime,
    ) -> RtcpPacket {
        let statistics = &state.statistics;
        let ssrc = statistics.ssrc();
        let reports = statistics.reception_reports(now);

        let report = if state.we_sent {
            let (rtp_time, packet_count, octet_count) = statistics.sender_info();
            Report::Sender(SenderReport {
                ssrc,
                ntp_time: unix2ntp(now),
                rtp_time,
                packet_count,
                octet_count,
                reports,
                ..Default::default()
            })
        } else {
            Report::Receiver(ReceiverReport {
                ssrc,
                reports,
                ..Default::default()
            })
        };

        let packet = RtcpPacket::new(report)
            .with_source_description(SourceDescription::with_cname(ssrc, statistics.cname()));

        match kind {
            ScheduledKind::Report => packet,
            ScheduledKind::Bye => packet.with_goodbye(Goodbye {
                sources: vec![ssrc],
                reason: self.bye_reason.clone(),
            }),
        }
    }

    fn delay_until(&self, timestamp: SystemTime) -> Result<Duration> {
        timestamp
            .duration_since(self.now())
            .map_err(|_| Error::ErrScheduleInPast(timestamp))
    }

    fn spawn_timer(&self, id: u64, delay: Duration) -> JoinHandle<()> {
        let me = self.me.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(internal) = me.upgrade() {
                if let Err(err) = internal.on_expire(id).await {
                    log::warn!("rtcp task {} expiry failed: {}", id, err);
                }
            }
        })
    }

    // replaces the pending task
    fn arm(
        &self,
        state: &mut SessionState,
        timestamp: SystemTime,
        packet: RtcpPacket,
        delay: Duration,
    ) {
        if let Some(task) = state.scheduled.take() {
            task.timer.abort();
        }

        let kind = ScheduledKind::from(packet.packet_type());
        let id = state.next_task_id();
        state.scheduled = Some(ScheduledTask {
            id,
            timestamp,
            packet,
            timer: self.spawn_timer(id, delay),
        });
        state.kind = kind;
        state.statistics.set_scheduled_packet_type(kind.into());
    }

    fn rearm(
        &self,
        state: &mut SessionState,
        timestamp: SystemTime,
        delay: Duration,
    ) -> Result<()> {
        let id = state.next_task_id();
        let task = state.scheduled.as_mut().ok_or(Error::ErrNotJoined)?;
        task.timer.abort();
        task.id = id;
        task.timestamp = timestamp;
        task.timer = self.spawn_timer(id, delay);
        Ok(())
    }

    /// schedule replaces the pending task with one transmitting packet at timestamp.
    /// A timestamp already gone fails with ErrScheduleInPast and leaves the pending task alone.
    pub(crate) fn schedule(
        &self,
        state: &mut SessionState,
        timestamp: SystemTime,
        packet: RtcpPacket,
    ) -> Result<()> {
        let delay = self.delay_until(timestamp)?;
        self.arm(state, timestamp, packet, delay);
        Ok(())
    }

    /// reschedule moves the pending task to timestamp.
    pub(crate) fn reschedule(&self, state: &mut SessionState, timestamp: SystemTime) -> Result<()> {
        let delay = self.delay_until(timestamp)?;
        self.rearm(state, timestamp, delay)
    }

    // a task that is already due expires at once
    fn schedule_or_expire(
        &self,
        state: &mut SessionState,
        timestamp: SystemTime,
        packet: RtcpPacket,
    ) {
        let delay = self.delay_until(timestamp).unwrap_or_else(|err| {
            log::warn!("{}, expiring at once", err);
            Duration::ZERO
        });
        self.arm(state, timestamp, packet, delay);
    }

    fn reschedule_or_expire(&self, state: &mut SessionState, timestamp: SystemTime) {
        let delay = self.delay_until(timestamp).unwrap_or_else(|err| {
            log::warn!("{}, expiring at once", err);
            Duration::ZERO
        });
        if let Err(err) = self.rearm(state, timestamp, delay) {
            log::warn!("failed rescheduling: {}", err);
        }
    }

    /// on_expire runs when the timer of task id fires. A superseded task is ignored.
    pub(crate) async fn on_expire(&self, id: u64) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.scheduled.as_ref().map(|t| t.id) != Some(id) {
            log::trace!("rtcp task {id} was superseded");
            return Ok(());
        }
        // the timer handle is dropped, not aborted: we may be running inside it
        let task = match state.scheduled.take() {
            Some(task) => task,
            None => return Ok(()),
        };

        let now = self.now();
        let t = state.statistics.rtcp_interval(state.initial);
        state.tn = state.tp + t;

        match task.kind() {
            ScheduledKind::Report => {
                if state.tn <= now {
                    let packet = self.build_packet(state, ScheduledKind::Report, now);
                    if let Err(err) = self.send(state, &packet) {
                        log::warn!("failed sending: {}", err);
                    }
                    state.statistics.calculate_avg_size(packet.size());
                    state.tp = now;
                    self.expire_we_sent(state);

                    // the first draw is conditioned on being small enough, redraw
                    let t = state.statistics.rtcp_interval(state.initial);
                    state.tn = now + t;

                    let next = self.build_packet(state, ScheduledKind::Report, now);
                    let tn = state.tn;
                    self.schedule_or_expire(state, tn, next);
                    state.initial = false;
                } else {
                    let next = self.build_packet(state, ScheduledKind::Report, now);
                    let tn = state.tn;
                    self.schedule_or_expire(state, tn, next);
                }
                state.statistics.confirm_members();
            }
            ScheduledKind::Bye => {
                if state.tn <= now {
                    let packet = self.build_packet(state, ScheduledKind::Bye, now);
                    if let Err(err) = self.send(state, &packet) {
                        log::warn!("failed sending BYE: {}", err);
                    }
                    state.tp = now;
                    state.status = SessionStatus::Left;
                    log::debug!("ssrc {} left the session", state.statistics.ssrc());
                } else {
                    let next = self.build_packet(state, ScheduledKind::Bye, now);
                    let tn = state.tn;
                    self.schedule_or_expire(state, tn, next);
                }
            }
        }

        Ok(())
    }

    // we stop being a sender once two reports went out without RTP in between
    fn expire_we_sent(&self, state: &mut SessionState) {
        if !state.we_sent {
            return;
        }
        state.reports_since_rtp += 1;
        if state.reports_since_rtp >= SENDER_TIMEOUT_INTERVALS {
            let ssrc = state.statistics.ssrc();
            state.we_sent = false;
            state.statistics.remove_sender(ssrc);
            log::debug!("ssrc {ssrc} stopped sending, reporting as a receiver");
        }
    }

    /// handle_packet applies a received compound packet to the session.
    /// Nothing is changed unless the whole datagram decodes and leads with a
    /// single SR or RR.
    pub(crate) async fn handle_packet(&self, buf: &[u8]) -> Result<()> {
        let mut raw = buf;
        let packet = RtcpPacket::unmarshal(&mut raw).map_err(Error::flatten)?;
        let ssrc = packet.report()?.ssrc();

        let now = self.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.status == SessionStatus::Closed {
            return Err(Error::ErrSessionClosed);
        }

        match packet.packet_type() {
            RtcpPacketType::Report => {
                // reports only grow the group while we are not leaving
                if state.kind == ScheduledKind::Report
                    && state.statistics.add_member(Some(ssrc), now)
                {
                    log::debug!("new member {ssrc}");
                }
                state.statistics.touch_member(ssrc, now);

                if let Some(sr) = packet.sender_report() {
                    state.statistics.add_sender(sr.ssrc, now);
                    state
                        .statistics
                        .sender_report_received(sr.ssrc, sr.ntp_time, now);
                }
            }
            RtcpPacketType::Bye => match state.kind {
                ScheduledKind::Report => self.remove_departed(state, &packet, ssrc, now),
                ScheduledKind::Bye => {
                    state.statistics.add_member(None, now);
                }
            },
        }

        state.statistics.calculate_avg_size(buf.len());
        Ok(())
    }

    fn remove_departed(
        &self,
        state: &mut SessionState,
        packet: &RtcpPacket,
        ssrc: u32,
        now: SystemTime,
    ) {
        let sources = match packet.goodbye() {
            Some(bye) if !bye.sources.is_empty() => bye.sources.clone(),
            _ => vec![ssrc],
        };

        for source in sources {
            state.statistics.remove_sender(source);
            if state.statistics.remove_member(source) {
                log::debug!("member {source} said BYE");
            }
        }

        self.reverse_reconsider(state, now);
    }

    /// reverse_reconsider pulls tn and tp towards now once the group shrank
    /// below pmembers, and confirms the new member count.
    fn reverse_reconsider(&self, state: &mut SessionState, now: SystemTime) {
        let members = state.statistics.members();
        let pmembers = state.statistics.pmembers();
        if members >= pmembers {
            return;
        }

        let (m, p) = (members as u32, pmembers as u32);
        state.tn = scale_around(now, state.tn, m, p);
        state.tp = scale_around(now, state.tp, m, p);

        if state.scheduled.is_some() {
            let tn = state.tn;
            self.reschedule_or_expire(state, tn);
        }
        state.statistics.confirm_members();
    }

    /// check_timeouts drops silent members and demotes silent senders. A group
    /// that shrank while reports are scheduled is reconsidered like after a BYE.
    pub(crate) async fn check_timeouts(&self) -> usize {
        let now = self.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let changed = state.statistics.sender_timeout_check(now);
        if changed > 0 {
            log::debug!("{} members or senders timed out", changed);
            if state.kind == ScheduledKind::Report {
                self.reverse_reconsider(state, now);
            }
        }
        changed
    }

    /// send encodes packet into the transmit buffer and writes it to the remote peer.
    fn send(&self, state: &mut SessionState, packet: &RtcpPacket) -> Result<usize> {
        let transport = match &state.transport {
            Some(t) if t.is_open() => Arc::clone(t),
            _ => return Err(Error::ErrTransportClosed),
        };
        let remote = transport.remote_addr().ok_or(Error::ErrNoRemoteAddr)?;

        let size = packet.size();
        if state.tx_buffer.len() < size {
            state.tx_buffer.resize(size, 0);
        }
        let n = packet.encode(&mut state.tx_buffer, 0)?;

        transport.send_to(&state.tx_buffer[..n], remote)
    }
}
