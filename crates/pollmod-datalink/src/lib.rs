//! Poll-driven Modbus frame assembly over non-blocking byte transports.
//!
//! Everything in this crate is single-threaded and cooperative: a channel
//! makes progress only inside [`poll`](RtuChannel::poll) calls, never blocks,
//! and signals "nothing yet" by returning without delivering an event. The
//! caller owns the loop cadence.
//!
//! Framed ADUs are delivered as [`FrameEvent`]s to a closure passed into
//! `poll`; the event's [`AduView`] borrows the channel's internal buffer and
//! is only valid for the duration of the sink call.

#![forbid(unsafe_code)]

use pollmod_core::DecodeError;
use thiserror::Error;

pub use pollmod_core::AduView;

pub mod ascii;
pub mod multi;
pub mod rtu;
pub mod sim;
pub mod tcp;

pub use ascii::AsciiChannel;
pub use multi::TcpChannelPool;
pub use rtu::RtuChannel;
pub use sim::SimTransport;
pub use tcp::TcpChannel;

/// Errors shared by the link layer and everything stacked on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(&'static str),
    #[error("checksum mismatch")]
    Crc,
    #[error("malformed frame")]
    InvalidFrame,
    #[error("no resources available")]
    NoResources,
    #[error("busy")]
    Busy,
    #[error("cancelled")]
    Cancelled,
}

impl From<DecodeError> for LinkError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::InvalidCrc => LinkError::Crc,
            _ => LinkError::InvalidFrame,
        }
    }
}

/// A non-blocking byte transport with a monotonic millisecond clock.
///
/// Implementations must never block: `receive` returns `Ok(0)` when no bytes
/// are available, and `send` reports how many bytes it actually accepted.
pub trait Transport {
    fn send(&mut self, data: &[u8]) -> Result<usize, LinkError>;

    /// Reads up to `buf.len()` bytes. `Ok(0)` means no data yet.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Monotonic milliseconds since an arbitrary epoch.
    fn now(&self) -> u64;

    /// Cooperative hint that the caller is about to spin. No-op by default.
    fn yield_now(&mut self) {}
}

/// One framed (or broken) ADU surfaced by a channel `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent<'a> {
    /// A complete, checksum-valid frame. `transaction_id` is populated by
    /// the TCP assembler and `None` on serial links.
    Frame {
        transaction_id: Option<u16>,
        adu: AduView<'a>,
    },
    /// Framing failed; the channel has already resynchronized.
    Broken {
        transaction_id: Option<u16>,
        error: LinkError,
    },
}

impl FrameEvent<'_> {
    pub fn is_frame(&self) -> bool {
        matches!(self, FrameEvent::Frame { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::LinkError;
    use pollmod_core::DecodeError;

    #[test]
    fn decode_errors_map_onto_link_errors() {
        assert_eq!(LinkError::from(DecodeError::InvalidCrc), LinkError::Crc);
        assert_eq!(
            LinkError::from(DecodeError::UnexpectedEof),
            LinkError::InvalidFrame
        );
        assert_eq!(
            LinkError::from(DecodeError::InvalidDelimiter),
            LinkError::InvalidFrame
        );
    }
}
