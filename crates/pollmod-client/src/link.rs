//! Transport-flavor dispatch for the client engine.

use pollmod_core::AduView;
use pollmod_datalink::{
    AsciiChannel, FrameEvent, LinkError, RtuChannel, TcpChannel, Transport,
};

/// Which wire format a link speaks. Determines response matching (TCP
/// responses carry a transaction id, serial links do not) and per-frame
/// overhead accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkKind {
    Rtu,
    Ascii,
    Tcp,
}

impl LinkKind {
    /// On-wire frame size for a PDU of `pdu_len` bytes.
    pub(crate) fn wire_len(self, pdu_len: usize) -> usize {
        match self {
            // unit id + CRC16
            LinkKind::Rtu => pdu_len + 3,
            // ':' + hex pairs of unit/pdu/lrc + CRLF
            LinkKind::Ascii => 2 * pdu_len + 7,
            // MBAP header
            LinkKind::Tcp => pdu_len + 7,
        }
    }
}

/// A frame assembler of any flavor, unified behind one submit/poll surface.
pub enum LinkLayer<T> {
    Rtu(RtuChannel<T>),
    Ascii(AsciiChannel<T>),
    Tcp(TcpChannel<T>),
}

impl<T: Transport> LinkLayer<T> {
    pub fn rtu(transport: T) -> Self {
        Self::Rtu(RtuChannel::new(transport))
    }

    pub fn ascii(transport: T) -> Self {
        Self::Ascii(AsciiChannel::new(transport))
    }

    pub fn tcp(transport: T) -> Self {
        Self::Tcp(TcpChannel::new(transport))
    }

    pub(crate) fn kind(&self) -> LinkKind {
        match self {
            Self::Rtu(_) => LinkKind::Rtu,
            Self::Ascii(_) => LinkKind::Ascii,
            Self::Tcp(_) => LinkKind::Tcp,
        }
    }

    /// Sends one ADU. `transaction_id` is only meaningful on TCP; serial
    /// flavors frame the ADU without it.
    pub(crate) fn submit(
        &mut self,
        transaction_id: u16,
        adu: &AduView<'_>,
    ) -> Result<(), LinkError> {
        match self {
            Self::Rtu(ch) => ch.submit(adu),
            Self::Ascii(ch) => ch.submit(adu),
            Self::Tcp(ch) => ch.submit(transaction_id, adu),
        }
    }

    pub(crate) fn poll<F>(&mut self, sink: &mut F) -> Result<(), LinkError>
    where
        F: FnMut(FrameEvent<'_>),
    {
        match self {
            Self::Rtu(ch) => ch.poll(sink),
            Self::Ascii(ch) => ch.poll(sink),
            Self::Tcp(ch) => ch.poll(sink),
        }
    }

    pub(crate) fn now(&self) -> u64 {
        match self {
            Self::Rtu(ch) => ch.transport().now(),
            Self::Ascii(ch) => ch.transport().now(),
            Self::Tcp(ch) => ch.transport().now(),
        }
    }
}

impl<T: Transport> From<RtuChannel<T>> for LinkLayer<T> {
    fn from(channel: RtuChannel<T>) -> Self {
        Self::Rtu(channel)
    }
}

impl<T: Transport> From<AsciiChannel<T>> for LinkLayer<T> {
    fn from(channel: AsciiChannel<T>) -> Self {
        Self::Ascii(channel)
    }
}

impl<T: Transport> From<TcpChannel<T>> for LinkLayer<T> {
    fn from(channel: TcpChannel<T>) -> Self {
        Self::Tcp(channel)
    }
}
