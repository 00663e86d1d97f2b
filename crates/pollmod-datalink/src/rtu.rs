//! RTU frame assembler.
//!
//! RTU has no in-band delimiters: a frame ends when the line goes quiet.
//! The assembler drains the transport one byte at a time and finalizes the
//! accumulated bytes once no byte has arrived for the configured silence
//! window.

use pollmod_core::encoding::Writer;
use pollmod_core::frame::rtu;
use pollmod_core::AduView;
use tracing::trace;

use crate::{FrameEvent, LinkError, Transport};

/// Default inter-frame silence window, in milliseconds.
///
/// Greater than the 3.5 character times of any common baud rate at or above
/// 9600; slower links should configure a wider window.
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 5;

/// Byte-stream to frame assembler for Modbus RTU.
pub struct RtuChannel<T> {
    transport: T,
    buf: [u8; rtu::MAX_FRAME_LEN],
    len: usize,
    receiving: bool,
    last_activity: u64,
    silence_timeout_ms: u64,
}

impl<T: Transport> RtuChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buf: [0; rtu::MAX_FRAME_LEN],
            len: 0,
            receiving: false,
            last_activity: 0,
            silence_timeout_ms: DEFAULT_SILENCE_TIMEOUT_MS,
        }
    }

    pub fn with_silence_timeout(mut self, timeout_ms: u64) -> Self {
        self.set_silence_timeout(timeout_ms);
        self
    }

    /// Sets the silence window; zero restores the default.
    pub fn set_silence_timeout(&mut self, timeout_ms: u64) {
        self.silence_timeout_ms = if timeout_ms == 0 {
            DEFAULT_SILENCE_TIMEOUT_MS
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
        let mut frame = [0u8; rtu::MAX_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        rtu::encode_adu(&mut w, adu).map_err(|_| LinkError::InvalidArgument)?;

        let wire = w.as_written();
        let sent = self.transport.send(wire)?;
        if sent != wire.len() {
            return Err(LinkError::Transport("short write"));
        }
        trace!(unit_id = adu.unit_id, len = wire.len(), "rtu frame sent");
        Ok(())
    }

    /// Drains available bytes, then checks the silence window.
    ///
    /// Complete or broken frames are handed to `sink`; the borrowed view is
    /// valid only inside the sink call. Returns the transport error, if any,
    /// after it has been reported through the sink.
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
            if elapsed >= self.silence_timeout_ms {
                self.finalize(None, sink);
            }
        }

        result
    }

    fn process_byte<F>(&mut self, byte: u8, sink: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        if self.len >= self.buf.len() {
            self.finalize(Some(LinkError::InvalidFrame), sink);
            return;
        }

        self.buf[self.len] = byte;
        self.len += 1;
        self.receiving = true;
        self.last_activity = self.transport.now();
    }

    fn finalize<F>(&mut self, error: Option<LinkError>, sink: &mut F)
    where
        F: FnMut(FrameEvent<'_>),
    {
        let frame = &self.buf[..self.len];
        let event = match error {
            Some(error) => FrameEvent::Broken {
                transaction_id: None,
                error,
            },
            None => match rtu::decode_adu(frame) {
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

    const FRAME: &[u8] = &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87];

    fn channel() -> (RtuChannel<SimTransport>, SimTransport) {
        let transport = SimTransport::new();
        let handle = transport.clone();
        (RtuChannel::new(transport).with_silence_timeout(10), handle)
    }

    #[test]
    fn frame_is_held_until_silence_elapses() {
        let (mut ch, sim) = channel();
        sim.push_rx(FRAME);

        let mut events = Vec::new();
        ch.poll(&mut |ev| events.push(matches!(ev, FrameEvent::Frame { .. })))
            .unwrap();
        assert!(events.is_empty());

        sim.advance(9);
        ch.poll(&mut |ev| events.push(matches!(ev, FrameEvent::Frame { .. })))
            .unwrap();
        assert!(events.is_empty());

        sim.advance(1);
        ch.poll(&mut |ev| events.push(matches!(ev, FrameEvent::Frame { .. })))
            .unwrap();
        assert_eq!(events, vec![true]);
    }

    #[test]
    fn split_delivery_is_reassembled() {
        let (mut ch, sim) = channel();
        let mut got = None;

        sim.push_rx(&FRAME[..3]);
        ch.poll(&mut |_| panic!("no event expected")).unwrap();
        sim.advance(4);
        sim.push_rx(&FRAME[3..]);
        ch.poll(&mut |_| panic!("no event expected")).unwrap();

        sim.advance(10);
        ch.poll(&mut |ev| {
            if let FrameEvent::Frame { adu, .. } = ev {
                got = Some((adu.unit_id, adu.function, adu.payload.to_vec()));
            }
        })
        .unwrap();
        assert_eq!(got, Some((0x11, 0x03, vec![0x00, 0x6B, 0x00, 0x03])));
    }

    #[test]
    fn corrupted_crc_reports_broken_frame() {
        let (mut ch, sim) = channel();
        let mut bad = FRAME.to_vec();
        bad[4] ^= 0xFF;
        sim.push_rx(&bad);
        ch.poll(&mut |_| panic!("no event expected")).unwrap();
        sim.advance(10);

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
    fn runt_frame_is_invalid() {
        let (mut ch, sim) = channel();
        sim.push_rx(&[0x11, 0x03]);
        ch.poll(&mut |_| panic!("no event expected")).unwrap();
        sim.advance(10);

        let mut errors = Vec::new();
        ch.poll(&mut |ev| {
            if let FrameEvent::Broken { error, .. } = ev {
                errors.push(error);
            }
        })
        .unwrap();
        assert_eq!(errors, vec![LinkError::InvalidFrame]);
    }

    #[test]
    fn overflow_discards_and_resynchronizes() {
        let (mut ch, sim) = channel();
        sim.push_rx(&[0xAA; rtu::MAX_FRAME_LEN + 1]);

        let mut errors = Vec::new();
        ch.poll(&mut |ev| {
            if let FrameEvent::Broken { error, .. } = ev {
                errors.push(error);
            }
        })
        .unwrap();
        assert_eq!(errors, vec![LinkError::InvalidFrame]);

        // A valid frame after the noise is assembled normally.
        sim.advance(10);
        sim.push_rx(FRAME);
        ch.poll(&mut |_| {}).unwrap();
        sim.advance(10);
        let mut frames = 0;
        ch.poll(&mut |ev| {
            if ev.is_frame() {
                frames += 1;
            }
        })
        .unwrap();
        assert_eq!(frames, 1);
    }

    #[test]
    fn submit_short_write_is_transport_error() {
        let (mut ch, sim) = channel();
        sim.limit_send(3);

        let adu = AduView::new(0x11, 0x03, &[0x00, 0x6B, 0x00, 0x03]);
        assert_eq!(
            ch.submit(&adu),
            Err(LinkError::Transport("short write"))
        );
    }

    #[test]
    fn submit_writes_crc_trailer() {
        let (mut ch, sim) = channel();
        let adu = AduView::new(0x11, 0x03, &[0x00, 0x6B, 0x00, 0x03]);
        ch.submit(&adu).unwrap();
        assert_eq!(sim.take_tx(), FRAME);
    }
}
