
use std::collections::BTreeMap;
use std::fmt;

use bytes::{Buf, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::application_defined::ApplicationDefined;
use crate::error::{Error, Result};
use crate::goodbye::Goodbye;
use crate::header::{Header, PacketType, HEADER_LENGTH};
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;

/// SubReportKind orders the sub-reports of a compound packet the way they go on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubReportKind {
    SenderReport,
    ReceiverReport,
    SourceDescription,
    ApplicationDefined,
    Goodbye,
}

/// SubReport is one of the sub-reports a compound packet can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubReport {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    ApplicationDefined(ApplicationDefined),
    Goodbye(Goodbye),
}

impl SubReport {
    pub fn kind(&self) -> SubReportKind {
        match self {
            SubReport::SenderReport(_) => SubReportKind::SenderReport,
            SubReport::ReceiverReport(_) => SubReportKind::ReceiverReport,
            SubReport::SourceDescription(_) => SubReportKind::SourceDescription,
            SubReport::ApplicationDefined(_) => SubReportKind::ApplicationDefined,
            SubReport::Goodbye(_) => SubReportKind::Goodbye,
        }
    }

    fn marshal_size(&self) -> usize {
        match self {
            SubReport::SenderReport(p) => p.marshal_size(),
            SubReport::ReceiverReport(p) => p.marshal_size(),
            SubReport::SourceDescription(p) => p.marshal_size(),
            SubReport::ApplicationDefined(p) => p.marshal_size(),
            SubReport::Goodbye(p) => p.marshal_size(),
        }
    }

    fn marshal_to(&self, buf: &mut [u8]) -> std::result::Result<usize, util::Error> {
        match self {
            SubReport::SenderReport(p) => p.marshal_to(buf),
            SubReport::ReceiverReport(p) => p.marshal_to(buf),
            SubReport::SourceDescription(p) => p.marshal_to(buf),
            SubReport::ApplicationDefined(p) => p.marshal_to(buf),
            SubReport::Goodbye(p) => p.marshal_to(buf),
        }
    }
}

impl fmt::Display for SubReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubReport::SenderReport(p) => write!(f, "{p}"),
            SubReport::ReceiverReport(p) => write!(f, "{p}"),
            SubReport::SourceDescription(p) => write!(f, "{p}"),
            SubReport::ApplicationDefined(p) => write!(f, "{p}"),
            SubReport::Goodbye(p) => write!(f, "{p}"),
        }
    }
}

/// Report is the leading sub-report every compound packet must start with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Sender(SenderReport),
    Receiver(ReceiverReport),
}

impl From<Report> for SubReport {
    fn from(report: Report) -> Self {
        match report {
            Report::Sender(sr) => SubReport::SenderReport(sr),
            Report::Receiver(rr) => SubReport::ReceiverReport(rr),
        }
    }
}

/// ReportRef borrows the leading report of a compound packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReportRef<'a> {
    Sender(&'a SenderReport),
    Receiver(&'a ReceiverReport),
}

impl ReportRef<'_> {
    /// ssrc of the participant that sent the report.
    pub fn ssrc(&self) -> u32 {
        match self {
            ReportRef::Sender(sr) => sr.ssrc,
            ReportRef::Receiver(rr) => rr.ssrc,
        }
    }
}

/// RtcpPacketType classifies a compound packet for scheduling purposes.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RtcpPacketType {
    #[default]
    Report,
    Bye,
}

impl fmt::Display for RtcpPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtcpPacketType::Report => write!(f, "REPORT"),
            RtcpPacketType::Bye => write!(f, "BYE"),
        }
    }
}

/// RtcpPacket is a compound RTCP packet: a leading SR or RR, optionally
/// followed by SDES, APP and BYE. Each kind appears at most once and is
/// always encoded in that order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RtcpPacket {
    parts: BTreeMap<SubReportKind, SubReport>,
}

impl fmt::Display for RtcpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("RtcpPacket ({}):\n", self.packet_type());
        for part in self.parts.values() {
            out += format!("{part}").as_str();
        }
        write!(f, "{out}")
    }
}

impl RtcpPacket {
    /// new starts a compound packet from its mandatory leading report.
    pub fn new(report: Report) -> Self {
        let mut packet = RtcpPacket::default();
        packet.insert(report.into());
        packet
    }

    pub fn with_source_description(mut self, sdes: SourceDescription) -> Self {
        self.insert(SubReport::SourceDescription(sdes));
        self
    }

    pub fn with_application_defined(mut self, app: ApplicationDefined) -> Self {
        self.insert(SubReport::ApplicationDefined(app));
        self
    }

    pub fn with_goodbye(mut self, bye: Goodbye) -> Self {
        self.insert(SubReport::Goodbye(bye));
        self
    }

    /// insert sets a sub-report, replacing any earlier one of the same kind.
    pub fn insert(&mut self, part: SubReport) -> Option<SubReport> {
        self.parts.insert(part.kind(), part)
    }

    /// sub_reports iterates over the present sub-reports in wire order.
    pub fn sub_reports(&self) -> impl Iterator<Item = &SubReport> {
        self.parts.values()
    }

    pub fn sender_report(&self) -> Option<&SenderReport> {
        match self.parts.get(&SubReportKind::SenderReport) {
            Some(SubReport::SenderReport(sr)) => Some(sr),
            _ => None,
        }
    }

    pub fn receiver_report(&self) -> Option<&ReceiverReport> {
        match self.parts.get(&SubReportKind::ReceiverReport) {
            Some(SubReport::ReceiverReport(rr)) => Some(rr),
            _ => None,
        }
    }

    pub fn source_description(&self) -> Option<&SourceDescription> {
        match self.parts.get(&SubReportKind::SourceDescription) {
            Some(SubReport::SourceDescription(sdes)) => Some(sdes),
            _ => None,
        }
    }

    pub fn application_defined(&self) -> Option<&ApplicationDefined> {
        match self.parts.get(&SubReportKind::ApplicationDefined) {
            Some(SubReport::ApplicationDefined(app)) => Some(app),
            _ => None,
        }
    }

    pub fn goodbye(&self) -> Option<&Goodbye> {
        match self.parts.get(&SubReportKind::Goodbye) {
            Some(SubReport::Goodbye(bye)) => Some(bye),
            _ => None,
        }
    }

    /// packet_type is Bye whenever a BYE sub-report is present.
    pub fn packet_type(&self) -> RtcpPacketType {
        if self.parts.contains_key(&SubReportKind::Goodbye) {
            RtcpPacketType::Bye
        } else {
            RtcpPacketType::Report
        }
    }

    /// report returns the sender report if present, else the receiver report.
    pub fn report(&self) -> Result<ReportRef<'_>> {
        if let Some(sr) = self.sender_report() {
            Ok(ReportRef::Sender(sr))
        } else if let Some(rr) = self.receiver_report() {
            Ok(ReportRef::Receiver(rr))
        } else {
            Err(Error::BadFirstPacket)
        }
    }

    /// size is the encoded length in octets.
    pub fn size(&self) -> usize {
        self.parts.values().map(|p| p.marshal_size()).sum()
    }

    /// packet_count is the number of sub-reports present.
    pub fn packet_count(&self) -> usize {
        self.parts.len()
    }

    /// decode parses sub-reports from raw starting at offset until the buffer is
    /// exhausted, and returns the offset it stopped at.
    ///
    /// A sub-report with an unknown type tag ends decoding: the error is logged,
    /// the sub-reports decoded so far are kept and raw.len() is returned.
    /// A truncated or malformed known sub-report is returned as an error.
    pub fn decode(&mut self, raw: &[u8], offset: usize) -> Result<usize> {
        if offset > raw.len() {
            return Err(Error::PacketTooShort);
        }

        let mut buf = &raw[offset..];
        while buf.has_remaining() {
            let mut peek = buf;
            let header = Header::unmarshal(&mut peek).map_err(Error::flatten)?;

            let part = match header.packet_type {
                PacketType::SenderReport => SubReport::SenderReport(
                    SenderReport::unmarshal(&mut buf).map_err(Error::flatten)?,
                ),
                PacketType::ReceiverReport => SubReport::ReceiverReport(
                    ReceiverReport::unmarshal(&mut buf).map_err(Error::flatten)?,
                ),
                PacketType::SourceDescription => SubReport::SourceDescription(
                    SourceDescription::unmarshal(&mut buf).map_err(Error::flatten)?,
                ),
                PacketType::ApplicationDefined => SubReport::ApplicationDefined(
                    ApplicationDefined::unmarshal(&mut buf).map_err(Error::flatten)?,
                ),
                PacketType::Goodbye => {
                    SubReport::Goodbye(Goodbye::unmarshal(&mut buf).map_err(Error::flatten)?)
                }
                _ => {
                    log::error!(
                        "unsupported RTCP sub-report type {} at offset {}, dropping the rest of the packet",
                        buf[1],
                        raw.len() - buf.len()
                    );
                    return Ok(raw.len());
                }
            };

            if let Some(old) = self.insert(part) {
                log::debug!("duplicate {:?} sub-report replaces the earlier one", old.kind());
            }
        }

        Ok(raw.len() - buf.len())
    }

    /// encode writes the present sub-reports into buf starting at offset, in wire
    /// order, and returns the offset after the last octet written.
    pub fn encode(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        if self.parts.is_empty() {
            return Err(Error::EmptyCompound);
        }
        self.report()?;

        if buf.len() < offset + self.size() {
            return Err(Error::BufferTooShort);
        }

        let mut pos = offset;
        for part in self.parts.values() {
            pos += part.marshal_to(&mut buf[pos..]).map_err(Error::flatten)?;
        }

        Ok(pos)
    }
}

impl MarshalSize for RtcpPacket {
    fn marshal_size(&self) -> usize {
        self.size()
    }
}

impl Marshal for RtcpPacket {
    fn marshal_to(&self, buf: &mut [u8]) -> std::result::Result<usize, util::Error> {
        Ok(self.encode(buf, 0)?)
    }
}

impl Unmarshal for RtcpPacket {
    /// unmarshal decodes a whole compound packet, which must start with an SR or RR
    /// and carry only one of them.
    fn unmarshal<B>(raw_packet: &mut B) -> std::result::Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < HEADER_LENGTH {
            return Err(Error::EmptyCompound.into());
        }

        let raw: Bytes = raw_packet.copy_to_bytes(raw_packet.remaining());
        let first_type = PacketType::from(raw[1]);
        if first_type != PacketType::SenderReport && first_type != PacketType::ReceiverReport {
            return Err(Error::BadFirstPacket.into());
        }

        let mut packet = RtcpPacket::default();
        packet.decode(&raw, 0)?;
        if packet.sender_report().is_some() && packet.receiver_report().is_some() {
            return Err(Error::BadFirstPacket.into());
        }

        Ok(packet)
    }
}
