#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! RTCP session handling after RFC 3550 section 6: a compound packet codec,
//! a membership and bandwidth ledger, and a scheduler that sends reports and
//! BYE on the randomized RTCP interval.

pub mod application_defined;
pub mod compound_packet;
mod error;
pub mod goodbye;
pub mod handler;
pub mod header;
pub mod mock;
pub mod packet;
pub mod receiver_report;
pub mod reception_report;
pub mod sender_report;
pub mod source_description;
pub mod statistics;
pub mod transport;
mod util;

pub use error::{Error, Result};
pub use util::{compact_ntp, unix2ntp};
