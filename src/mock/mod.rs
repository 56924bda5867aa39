//! Test doubles for driving an RtcpHandler deterministically.

pub mod mock_statistics;
pub mod mock_time;
pub mod mock_transport;
