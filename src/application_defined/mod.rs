
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;

type Result<T> = std::result::Result<T, util::Error>;

const APP_NAME_LENGTH: usize = 4;

/// ApplicationDefined (APP) carries experimental or application-specific
/// control data, identified by a four character name.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct ApplicationDefined {
    /// Subtype, carried in the count field of the header.
    pub sub_type: u8,
    /// SSRC of the source that sent this packet.
    pub ssrc: u32,
    /// Four ASCII characters naming the application.
    pub name: [u8; APP_NAME_LENGTH],
    /// Application-dependent data, a multiple of 32 bits long.
    pub data: Bytes,
}

impl ApplicationDefined {
    /// name_str returns the packet name, or None if it is not printable ASCII.
    pub fn name_str(&self) -> Option<&str> {
        if self.name.iter().all(|c| c.is_ascii_graphic() || *c == b' ') {
            std::str::from_utf8(&self.name).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for ApplicationDefined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ApplicationDefined from {:x}\n\tName: {:?}\n\tSubtype: {}\n\tData: {:?}\n",
            self.ssrc, self.name, self.sub_type, self.data
        )
    }
}

impl Packet for ApplicationDefined {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.sub_type,
            packet_type: PacketType::ApplicationDefined,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + SSRC_LENGTH + APP_NAME_LENGTH + self.data.len()
    }
}

impl MarshalSize for ApplicationDefined {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for ApplicationDefined {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P| subtype |   PT=APP=204  |             length            |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           SSRC/CSRC                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                          name (ASCII)                         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                   application-dependent data                ...
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if self.sub_type as usize > COUNT_MAX {
            return Err(Error::InvalidHeader.into());
        }
        if !self.name.is_ascii() {
            return Err(Error::InvalidAppName.into());
        }
        if self.data.len() % 4 != 0 {
            return Err(Error::InvalidAppDataLength.into());
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }

        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put(self.data.clone());

        Ok(self.marshal_size())
    }
}

impl Unmarshal for ApplicationDefined {
    /// unmarshal decodes one ApplicationDefined off the front of raw_packet
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw_packet)?;
        if header.packet_type != PacketType::ApplicationDefined {
            return Err(Error::WrongType.into());
        }

        let mut body = take_body(raw_packet, &header)?;
        if body.remaining() < SSRC_LENGTH + APP_NAME_LENGTH {
            return Err(Error::PacketTooShort.into());
        }

        let ssrc = body.get_u32();
        let mut name = [0u8; APP_NAME_LENGTH];
        body.copy_to_slice(&mut name);

        // data must stay 32-bit aligned once padding is stripped
        if body.len() % 4 != 0 {
            return Err(Error::InvalidAppDataLength.into());
        }

        Ok(ApplicationDefined {
            sub_type: header.count,
            ssrc,
            name,
            data: body,
        })
    }
}
