//! MBAP frame assembler.
//!
//! TCP framing is header-led: each frame announces its own length, so the
//! assembler buffers raw bytes and extracts as many complete frames per poll
//! as the buffer holds. A header with a bad protocol id or length is skipped
//! to resynchronize with the next frame boundary.

use pollmod_core::encoding::Writer;
use pollmod_core::frame::{tcp, AduView, PDU_MAX};
use tracing::trace;

use crate::{FrameEvent, LinkError, Transport};

/// Receive buffer size; comfortably above the largest MBAP frame.
pub const RX_BUFFER_LEN: usize = 512;

const RECV_CHUNK_LEN: usize = 64;

/// Transaction id, protocol id and length; the fields before the unit id.
const HEADER_PREFIX_LEN: usize = 6;

/// Byte-stream to frame assembler for Modbus TCP.
pub struct TcpChannel<T> {
    transport: T,
    buf: [u8; RX_BUFFER_LEN],
    len: usize,
}

impl<T: Transport> TcpChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buf: [0; RX_BUFFER_LEN],
            len: 0,
        }
    }

    /// Drops any buffered bytes.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Encodes and sends one ADU under the given transaction id.
    pub fn submit(&mut self, transaction_id: u16, adu: &AduView<'_>) -> Result<(), LinkError> {
        let mut frame = [0u8; tcp::MAX_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        tcp::encode_adu(&mut w, transaction_id, adu).map_err(|_| LinkError::InvalidArgument)?;

        let wire = w.as_written();
        let sent = self.transport.send(wire)?;
        if sent != wire.len() {
            return Err(LinkError::Transport("short write"));
        }
        trace!(
            transaction_id,
            unit_id = adu.unit_id,
            len = wire.len(),
            "mbap frame sent"
        );
        Ok(())
    }

    /// Reads one chunk from the transport and extracts every complete frame.
    ///
    /// An incomplete frame body stays buffered for a later poll; a corrupt
    /// header produces a `Broken` event and the assembler skips it.
    pub fn poll<F>(&mut self, sink: &mut F) -> Result<(), LinkError>
    where
        F: FnMut(FrameEvent<'_>),
    {
        let mut chunk = [0u8; RECV_CHUNK_LEN];
        match self.transport.receive(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                if self.len + n > self.buf.len() {
                    self.len = 0;
                    sink(FrameEvent::Broken {
                        transaction_id: None,
                        error: LinkError::InvalidFrame,
                    });
                    return Err(LinkError::InvalidFrame);
                }
                self.buf[self.len..self.len + n].copy_from_slice(&chunk[..n]);
                self.len += n;
            }
            Err(err) => {
                sink(FrameEvent::Broken {
                    transaction_id: None,
                    error: err,
                });
                return Err(err);
            }
        }

        self.extract_frames(sink);
        Ok(())
    }

    fn extract_frames<F>(&mut self, sink: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        while self.len >= HEADER_PREFIX_LEN {
            let transaction_id = u16::from_be_bytes([self.buf[0], self.buf[1]]);
            let protocol_id = u16::from_be_bytes([self.buf[2], self.buf[3]]);
            let length = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;

            if protocol_id != 0 || length == 0 || length > PDU_MAX + 1 {
                sink(FrameEvent::Broken {
                    transaction_id: Some(transaction_id),
                    error: LinkError::InvalidFrame,
                });
                self.consume(HEADER_PREFIX_LEN);
                continue;
            }

            let total_len = HEADER_PREFIX_LEN + length;
            if self.len < total_len {
                // Body still in flight; keep waiting.
                return;
            }

            let pdu_len = length - 1;
            if pdu_len == 0 {
                sink(FrameEvent::Broken {
                    transaction_id: Some(transaction_id),
                    error: LinkError::InvalidFrame,
                });
                self.consume(total_len);
                continue;
            }

            let unit_id = self.buf[6];
            let function = self.buf[7];
            let adu = AduView::new(unit_id, function, &self.buf[8..total_len]);
            sink(FrameEvent::Frame {
                transaction_id: Some(transaction_id),
                adu,
            });
            self.consume(total_len);
        }
    }

    fn consume(&mut self, count: usize) {
        if count >= self.len {
            self.len = 0;
            return;
        }
        self.buf.copy_within(count..self.len, 0);
        self.len -= count;
    }
}
