use std::fmt;

use util::marshal::{Marshal, Unmarshal};

use crate::header::Header;

/// Packet represents a single RTCP sub-report: one header plus its body, as framed
/// inside a compound datagram.
pub trait Packet: Marshal + Unmarshal + fmt::Display + fmt::Debug {
    fn header(&self) -> Header;
    /// destination_ssrc returns the SSRC values this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32>;
    /// raw_size is the encoded length before 32-bit alignment.
    fn raw_size(&self) -> usize;
}
