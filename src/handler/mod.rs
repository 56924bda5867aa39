mod session;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use waitgroup::WaitGroup;

pub use session::{ScheduledKind, SessionStatus};

use session::HandlerInternal;

use crate::error::{Error, Result};
use crate::header::{HEADER_LENGTH, RTP_VERSION, SSRC_LENGTH, VERSION_MASK, VERSION_SHIFT};
use crate::statistics::{RtpStatistics, Statistics};
use crate::transport::Transport;

pub type FnTimeGen = Arc<dyn (Fn() -> SystemTime) + Sync + 'static + Send>;

/// Period of the member and sender timeout check.
pub const DEFAULT_SSRC_POLL_INTERVAL: Duration = Duration::from_secs(7);

/// PacketHandler is implemented by the consumers of datagrams read off a channel.
#[async_trait]
pub trait PacketHandler {
    /// can_handle tells whether handle would accept buf.
    fn can_handle(&self, buf: &[u8]) -> bool;
    /// handle processes buf and returns the reply to send back, if any.
    async fn handle(&self, buf: &[u8]) -> Result<Option<Bytes>>;
}

/// is_rtcp checks the version and the packet type range of the first header.
pub fn is_rtcp(buf: &[u8]) -> bool {
    // a compound packet starts with an SR or RR, which carries an SSRC
    if buf.len() < HEADER_LENGTH + SSRC_LENGTH {
        return false;
    }

    let version = (buf[0] >> VERSION_SHIFT) & VERSION_MASK;
    let rtcp_packet_type = buf[1];
    version == RTP_VERSION && (192..=223).contains(&rtcp_packet_type)
}

/// SessionSnapshot is a point-in-time copy of the scheduler state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub tp: SystemTime,
    pub tn: SystemTime,
    pub initial: bool,
    pub we_sent: bool,
    /// Kind the member table logic currently gates on.
    pub kind: ScheduledKind,
    /// Kind and due time of the pending transmission.
    pub scheduled: Option<(ScheduledKind, SystemTime)>,
    pub members: usize,
    pub pmembers: usize,
    pub senders: usize,
    pub avg_size: f64,
    pub ssrc_poll_active: bool,
}

/// RtcpHandlerBuilder can be used to configure an RtcpHandler.
#[derive(Default)]
pub struct RtcpHandlerBuilder {
    statistics: Option<Box<dyn Statistics>>,
    transport: Option<Arc<dyn Transport>>,
    now: Option<FnTimeGen>,
    ssrc_poll_interval: Option<Duration>,
    bye_reason: Option<Bytes>,
}

impl RtcpHandlerBuilder {
    /// with_statistics sets the ledger the scheduler reads and updates.
    /// A fresh RtpStatistics is used otherwise.
    pub fn with_statistics(mut self, statistics: impl Statistics + 'static) -> RtcpHandlerBuilder {
        self.statistics = Some(Box::new(statistics));
        self
    }

    /// with_transport sets the channel reports are sent on.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> RtcpHandlerBuilder {
        self.transport = Some(transport);
        self
    }

    /// with_now_fn sets an alternative for the time.Now function.
    pub fn with_now_fn(mut self, now: FnTimeGen) -> RtcpHandlerBuilder {
        self.now = Some(now);
        self
    }

    /// with_ssrc_poll_interval sets how often silent members and senders are timed out.
    pub fn with_ssrc_poll_interval(mut self, interval: Duration) -> RtcpHandlerBuilder {
        self.ssrc_poll_interval = Some(interval);
        self
    }

    /// with_bye_reason sets the reason carried in our BYE.
    pub fn with_bye_reason(mut self, reason: impl Into<Bytes>) -> RtcpHandlerBuilder {
        self.bye_reason = Some(reason.into());
        self
    }

    pub fn build(self) -> RtcpHandler {
        let statistics = match self.statistics {
            Some(statistics) => statistics,
            None => {
                let now = match &self.now {
                    Some(f) => f(),
                    None => SystemTime::now(),
                };
                Box::new(RtpStatistics::builder().build(now))
            }
        };

        RtcpHandler {
            internal: HandlerInternal::new(
                statistics,
                self.transport,
                self.now,
                self.bye_reason.unwrap_or_default(),
            ),
            ssrc_poll_interval: self
                .ssrc_poll_interval
                .unwrap_or(DEFAULT_SSRC_POLL_INTERVAL),
            wg: Mutex::new(None),
            close_tx: Mutex::new(None),
        }
    }
}

/// RtcpHandler runs the RTCP side of one RTP session: it schedules our reports
/// and BYE on the randomized RTCP interval and keeps the member table current
/// from the compound packets it is handed.
pub struct RtcpHandler {
    pub(crate) internal: Arc<HandlerInternal>,
    pub(crate) ssrc_poll_interval: Duration,

    pub(crate) wg: Mutex<Option<WaitGroup>>,
    pub(crate) close_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl RtcpHandler {
    /// builder returns a new RtcpHandlerBuilder.
    pub fn builder() -> RtcpHandlerBuilder {
        RtcpHandlerBuilder::default()
    }

    /// join schedules our first report and starts timing out silent members.
    pub async fn join(&self) -> Result<()> {
        self.internal.join().await?;
        self.start_ssrc_poll().await;
        Ok(())
    }

    /// leave stops the timeout checks and schedules our BYE. The session
    /// keeps running until the BYE is sent.
    pub async fn leave(&self) -> Result<()> {
        match self.internal.status().await {
            SessionStatus::Joined => {}
            SessionStatus::Closed => return Err(Error::ErrSessionClosed),
            _ => return Err(Error::ErrNotJoined),
        }

        self.stop_ssrc_poll().await;
        self.internal.leave().await
    }

    /// close cancels every timer without saying BYE.
    pub async fn close(&self) -> Result<()> {
        self.stop_ssrc_poll().await;
        self.internal.close().await;
        Ok(())
    }

    /// rtp_sent accounts for an RTP packet we sent, so our reports become SRs.
    pub async fn rtp_sent(&self, rtp_timestamp: u32, payload_len: usize) {
        self.internal.rtp_sent(rtp_timestamp, payload_len).await
    }

    /// rtp_received accounts for an RTP packet received from ssrc.
    pub async fn rtp_received(&self, ssrc: u32) {
        self.internal.rtp_received(ssrc).await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let ssrc_poll_active = {
            let close_tx = self.close_tx.lock().await;
            close_tx.is_some()
        };

        let state = self.internal.state.lock().await;
        SessionSnapshot {
            status: state.status,
            tp: state.tp,
            tn: state.tn,
            initial: state.initial,
            we_sent: state.we_sent,
            kind: state.kind,
            scheduled: state
                .scheduled
                .as_ref()
                .map(|task| (task.kind(), task.timestamp)),
            members: state.statistics.members(),
            pmembers: state.statistics.pmembers(),
            senders: state.statistics.senders(),
            avg_size: state.statistics.avg_size(),
            ssrc_poll_active,
        }
    }

    async fn start_ssrc_poll(&self) {
        let (close_tx, close_rx) = mpsc::channel(1);
        let wg = WaitGroup::new();
        let worker = wg.worker();
        {
            let mut tx = self.close_tx.lock().await;
            *tx = Some(close_tx);
        }
        {
            let mut wait_group = self.wg.lock().await;
            *wait_group = Some(wg);
        }

        let internal = Arc::clone(&self.internal);
        let period = self.ssrc_poll_interval;
        tokio::spawn(async move {
            let _d = worker;
            RtcpHandler::run_ssrc_poll(internal, period, close_rx).await;
        });
    }

    async fn stop_ssrc_poll(&self) {
        {
            let mut close_tx = self.close_tx.lock().await;
            close_tx.take();
        }

        {
            let mut wait_group = self.wg.lock().await;
            if let Some(wg) = wait_group.take() {
                wg.wait().await;
            }
        }
    }

    async fn run_ssrc_poll(
        internal: Arc<HandlerInternal>,
        period: Duration,
        mut close_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    internal.check_timeouts().await;
                }
                _ = close_rx.recv() => {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl PacketHandler for RtcpHandler {
    fn can_handle(&self, buf: &[u8]) -> bool {
        is_rtcp(buf)
    }

    async fn handle(&self, buf: &[u8]) -> Result<Option<Bytes>> {
        if !self.can_handle(buf) {
            log::warn!("cannot handle incoming packet");
            return Err(Error::ErrCannotHandle);
        }

        if let Err(err) = self.internal.handle_packet(buf).await {
            log::warn!("dropping RTCP packet: {}", err);
            return Err(err);
        }

        // RTCP never replies
        Ok(None)
    }
}
