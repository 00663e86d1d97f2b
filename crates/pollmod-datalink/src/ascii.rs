//! ASCII frame assembler.
//!
//! ASCII frames are self-delimiting: `:` starts a frame (and restarts one if
//! it appears mid-frame), LF completes it. A stalled sender is detected with
//! an inter-character timeout and surfaced as a broken frame.

use pollmod_core::encoding::Writer;
use pollmod_core::frame::{ascii, PAYLOAD_MAX};
use pollmod_core::AduView;
use tracing::trace;

use crate::{FrameEvent, LinkError, Transport};

/// Default inter-character timeout, in milliseconds.
pub const DEFAULT_INTER_CHAR_TIMEOUT_MS: u64 = 1000;

/// Byte-stream to frame assembler for Modbus ASCII.
pub struct AsciiChannel<T> {
    transport: T,
    buf: [u8; ascii::MAX_FRAME_LEN],
    len: usize,
    receiving: bool,
    last_activity: u64,
    inter_char_timeout_ms: u64,
    // Decoded unit/function/payload bytes land here; frame events borrow it.
    payload: [u8; PAYLOAD_MAX + 2],
}

impl<T: Transport> AsciiChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buf: [0; ascii::MAX_FRAME_LEN],
            len: 0,
            receiving: false,
            last_activity: 0,
            inter_char_timeout_ms: DEFAULT_INTER_CHAR_TIMEOUT_MS,
            payload: [0; PAYLOAD_MAX + 2],
        }
    }

    pub fn with_inter_char_timeout(mut self, timeout_ms: u64) -> Self {
        self.set_inter_char_timeout(timeout_ms);
        self
    }

    /// Sets the inter-character timeout; zero restores the default.
    pub fn set_inter_char_timeout(&mut self, timeout_ms: u64) {
        self.inter_char_timeout_ms = if timeout_ms == 0 {
            DEFAULT_INTER_CHAR_TIMEOUT_MS
        } else {
            timeout_ms
        };
    }

    /// Drops any partially assembled frame.
    pub fn reset(&mut self) {
        self.len = 0;
        self.receiving = false;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Encodes and sends one ADU. A short write is a transport failure.
    pub fn submit(&mut self, adu: &AduView<'_>) -> Result<(), LinkError> {
        let mut frame = [0u8; ascii::MAX_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        ascii::encode_adu(&mut w, adu).map_err(|_| LinkError::InvalidArgument)?;

        let wire = w.as_written();
        let sent = self.transport.send(wire)?;
        if sent != wire.len() {
            return Err(LinkError::Transport("short write"));
        }
        trace!(unit_id = adu.unit_id, len = wire.len(), "ascii frame sent");
        Ok(())
    }

    /// Drains available bytes, then checks the inter-character timeout.
    pub fn poll<F>(&mut self, sink: &mut F) -> Result<(), LinkError>
    where
        F: FnMut(FrameEvent<'_>),
    {
        let mut result = Ok(());

        loop {
            let mut byte = [0u8; 1];
            match self.transport.receive(&mut byte) {
                Ok(0) => break,
                Ok(_) => self.process_byte(byte[0], sink),
                Err(err) => {
                    sink(FrameEvent::Broken {
                        transaction_id: None,
                        error: err,
                    });
                    result = Err(err);
                    break;
                }
            }
        }

        if self.receiving {
            let elapsed = self.transport.now().saturating_sub(self.last_activity);
            if elapsed >= self.inter_char_timeout_ms {
                self.finalize(Some(LinkError::Timeout), sink);
            }
        }

        result
    }

    fn process_byte<F>(&mut self, byte: u8, sink: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        if byte == ascii::START {
            // A colon always begins a frame, discarding any partial one.
            self.len = 0;
            self.receiving = true;
            self.last_activity = self.transport.now();
            self.buf[self.len] = byte;
            self.len += 1;
            return;
        }

        if !self.receiving {
            return;
        }

        if self.len >= self.buf.len() {
            self.finalize(Some(LinkError::InvalidFrame), sink);
            return;
        }

        self.buf[self.len] = byte;
        self.len += 1;
        self.last_activity = self.transport.now();

        if byte == b'\n' {
            self.finalize(None, sink);
        }
    }

    fn finalize<F>(&mut self, error: Option<LinkError>, sink: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        let event = match error {
            Some(error) => FrameEvent::Broken {
                transaction_id: None,
                error,
            },
            None => match ascii::decode_adu(&self.buf[..self.len], &mut self.payload) {
                Ok(adu) => FrameEvent::Frame {
                    transaction_id: None,
                    adu,
                },
                Err(err) => FrameEvent::Broken {
                    transaction_id: None,
                    error: err.into(),
                },
            },
        };
        sink(event);

        self.len = 0;
        self.receiving = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTransport;

    const FRAME: &[u8] = b":1103006B00037E\r\n";

    fn channel() -> (AsciiChannel<SimTransport>, SimTransport) {
        let transport = SimTransport::new();
        let handle = transport.clone();
        (AsciiChannel::new(transport), handle)
    }

    #[test]
    fn newline_completes_a_frame() {
        let (mut ch, sim) = channel();
        sim.push_rx(FRAME);

        let mut got = None;
        ch.poll(&mut |ev| {
            if let FrameEvent::Frame { adu, .. } = ev {
                got = Some((adu.unit_id, adu.function, adu.payload.to_vec()));
            }
        })
        .unwrap();
        assert_eq!(got, Some((0x11, 0x03, vec![0x00, 0x6B, 0x00, 0x03])));
    }

    #[test]
    fn noise_before_start_is_ignored() {
        let (mut ch, sim) = channel();
        sim.push_rx(b"\xFFnoise\r\n");
        sim.push_rx(FRAME);

        let mut frames = 0;
        ch.poll(&mut |ev| {
            assert!(ev.is_frame());
            frames += 1;
        })
        .unwrap();
        assert_eq!(frames, 1);
    }

    #[test]
    fn colon_mid_frame_restarts_assembly() {
        let (mut ch, sim) = channel();
        sim.push_rx(b":110300");
        sim.push_rx(FRAME);

        let mut frames = 0;
        ch.poll(&mut |ev| {
            assert!(ev.is_frame());
            frames += 1;
        })
        .unwrap();
        assert_eq!(frames, 1);
    }

    #[test]
    fn stalled_frame_times_out() {
        let (mut ch, sim) = channel();
        sim.push_rx(b":1103006B");
        ch.poll(&mut |_| panic!("no event expected")).unwrap();

        sim.advance(999);
        ch.poll(&mut |_| panic!("no event expected")).unwrap();

        sim.advance(1);
        let mut errors = Vec::new();
        ch.poll(&mut |ev| {
            if let FrameEvent::Broken { error, .. } = ev {
                errors.push(error);
            }
        })
        .unwrap();
        assert_eq!(errors, vec![LinkError::Timeout]);

        // The channel is idle again and accepts a fresh frame.
        sim.push_rx(FRAME);
        let mut frames = 0;
        ch.poll(&mut |ev| {
            assert!(ev.is_frame());
            frames += 1;
        })
        .unwrap();
        assert_eq!(frames, 1);
    }

    #[test]
    fn bad_lrc_reports_crc_error() {
        let (mut ch, sim) = channel();
        sim.push_rx(b":1103006B00037F\r\n");

        let mut errors = Vec::new();
        ch.poll(&mut |ev| {
            if let FrameEvent::Broken { error, .. } = ev {
                errors.push(error);
            }
        })
        .unwrap();
        assert_eq!(errors, vec![LinkError::Crc]);
    }

    #[test]
    fn submit_emits_wire_image() {
        let (mut ch, sim) = channel();
        let adu = AduView::new(0x11, 0x03, &[0x00, 0x6B, 0x00, 0x03]);
        ch.submit(&adu).unwrap();
        assert_eq!(sim.take_tx(), FRAME);
    }
}
