use std::io;
use std::time::SystemTime;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Wrong marshal size.
    #[error("Wrong marshal size")]
    WrongMarshalSize,
    /// Packet lost exceeds maximum amount of packets
    /// that can possibly be lost.
    #[error("Invalid total lost count")]
    InvalidTotalLost,
    /// Packet contains an invalid header.
    #[error("Invalid header")]
    InvalidHeader,
    /// Packet contains empty compound.
    #[error("Empty compound packet")]
    EmptyCompound,
    /// Invalid first packet in compound packets. First packet
    /// should either be a SenderReport packet or ReceiverReport
    #[error("First packet in compound must be SR or RR")]
    BadFirstPacket,
    /// Too many reports.
    #[error("Too many reports")]
    TooManyReports,
    /// Too many chunks.
    #[error("Too many chunks")]
    TooManyChunks,
    /// Too many sources.
    #[error("too many sources")]
    TooManySources,
    /// Packet received is too short.
    #[error("Packet too short to be read")]
    PacketTooShort,
    /// Buffer is too short.
    #[error("Buffer too short to be written")]
    BufferTooShort,
    /// Wrong packet type.
    #[error("Wrong packet type")]
    WrongType,
    /// SDES received is too long.
    #[error("SDES must be < 255 octets long")]
    SdesTextTooLong,
    /// SDES type is missing.
    #[error("SDES item missing type")]
    SdesMissingType,
    /// Reason is too long.
    #[error("Reason must be < 255 octets long")]
    ReasonTooLong,
    /// Invalid packet version.
    #[error("Invalid packet version")]
    BadVersion,
    /// Invalid padding value.
    #[error("Invalid padding value")]
    WrongPadding,
    /// APP name must be exactly four ASCII characters.
    #[error("APP name must be 4 octets long")]
    InvalidAppName,
    /// APP data must be a multiple of 32 bits.
    #[error("APP data must be a multiple of 4 octets")]
    InvalidAppDataLength,

    /// The datagram is not an RTCP packet at all.
    #[error("cannot handle incoming packet")]
    ErrCannotHandle,
    /// A schedule or reschedule was requested for a time already gone.
    #[error("scheduled time {0:?} is in the past")]
    ErrScheduleInPast(SystemTime),
    #[error("session already joined")]
    ErrAlreadyJoined,
    #[error("session not joined")]
    ErrNotJoined,
    #[error("session closed")]
    ErrSessionClosed,
    #[error("transport has no remote address")]
    ErrNoRemoteAddr,
    #[error("transport closed")]
    ErrTransportClosed,

    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Util(#[from] util::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// io::Error is not PartialEq, compare by kind.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl From<Error> for util::Error {
    fn from(e: Error) -> Self {
        util::Error::from_std(e)
    }
}

impl PartialEq<util::Error> for Error {
    fn eq(&self, other: &util::Error) -> bool {
        if let Some(down) = other.downcast_ref::<Error>() {
            return self == down;
        }
        false
    }
}

impl Error {
    /// Unwraps a codec error that travelled through `util::Error`.
    pub(crate) fn flatten(e: util::Error) -> Self {
        match e.downcast_ref::<Error>() {
            Some(_) => {
                if let util::Error::Std(std_err) = e {
                    if let Ok(inner) = std_err.0.downcast::<Error>() {
                        return *inner;
                    }
                }
                Error::Other("unreachable util::Error downcast".to_owned())
            }
            None => Error::Util(e),
        }
    }
}
