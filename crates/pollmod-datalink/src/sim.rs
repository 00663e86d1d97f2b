//! In-memory transport with a manually advanced clock.
//!
//! `SimTransport` is cloneable; every clone shares the same byte queues and
//! clock, so a test can hand one clone to a channel and keep another to
//! script traffic and drive time.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::{LinkError, Transport};

#[derive(Debug, Default)]
struct Inner {
    now_ms: u64,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    send_limit: Option<usize>,
    fail_send: Option<LinkError>,
    fail_receive: Option<LinkError>,
}

/// Simulated byte transport for tests.
#[derive(Clone, Debug, Default)]
pub struct SimTransport {
    inner: Rc<RefCell<Inner>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the shared clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.inner.borrow_mut().now_ms += ms;
    }

    /// Queues bytes for the channel to receive.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.inner.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Takes everything the channel has sent so far.
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.borrow_mut().tx)
    }

    pub fn pending_rx(&self) -> usize {
        self.inner.borrow().rx.len()
    }

    /// Caps every subsequent `send` at `limit` bytes.
    pub fn limit_send(&self, limit: usize) {
        self.inner.borrow_mut().send_limit = Some(limit);
    }

    /// Makes the next `send` fail with `error`.
    pub fn fail_next_send(&self, error: LinkError) {
        self.inner.borrow_mut().fail_send = Some(error);
    }

    /// Makes the next `receive` fail with `error`.
    pub fn fail_next_receive(&self, error: LinkError) {
        self.inner.borrow_mut().fail_receive = Some(error);
    }
}

impl Transport for SimTransport {
    fn send(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(err) = inner.fail_send.take() {
            return Err(err);
        }
        let n = inner.send_limit.map_or(data.len(), |cap| cap.min(data.len()));
        inner.tx.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(err) = inner.fail_receive.take() {
            return Err(err);
        }
        let n = buf.len().min(inner.rx.len());
        for slot in buf[..n].iter_mut() {
            *slot = inner.rx.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn now(&self) -> u64 {
        self.inner.borrow().now_ms
    }
}
