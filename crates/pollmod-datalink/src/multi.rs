//! Multiplexer over several TCP channels.
//!
//! The pool owns a fixed number of slots allocated up front; each active slot
//! wraps one [`TcpChannel`]. Events carry the slot index so a shared sink can
//! route frames back to the connection they arrived on.

use pollmod_core::AduView;
use tracing::debug;

use crate::tcp::TcpChannel;
use crate::{FrameEvent, LinkError, Transport};

/// Default number of connection slots.
pub const DEFAULT_SLOT_COUNT: usize = 8;

/// Fixed-capacity pool of TCP frame assemblers.
pub struct TcpChannelPool<T> {
    slots: Vec<Option<TcpChannel<T>>>,
    active: usize,
}

impl<T: Transport> TcpChannelPool<T> {
    pub fn new() -> Self {
        Self::with_slots(DEFAULT_SLOT_COUNT)
    }

    /// Creates a pool with `slot_count` slots. The slot array is allocated
    /// once here; `add`/`remove` never reallocate.
    pub fn with_slots(slot_count: usize) -> Self {
        let mut slots = Vec::with_capacity(slot_count);
        slots.resize_with(slot_count, || None);
        Self { slots, active: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn is_active(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(Option::is_some)
    }

    /// Binds a transport to a free slot and returns its index.
    pub fn add(&mut self, transport: T) -> Result<usize, LinkError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(LinkError::NoResources)?;
        self.slots[slot] = Some(TcpChannel::new(transport));
        self.active += 1;
        debug!(slot, active = self.active, "tcp slot bound");
        Ok(slot)
    }

    /// Releases a slot, returning its transport.
    pub fn remove(&mut self, slot: usize) -> Result<T, LinkError> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(LinkError::InvalidArgument)?
            .take()
            .ok_or(LinkError::InvalidArgument)?;
        self.active -= 1;
        debug!(slot, active = self.active, "tcp slot released");
        Ok(entry.into_transport())
    }

    fn channel(&mut self, slot: usize) -> Result<&mut TcpChannel<T>, LinkError> {
        self.slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(LinkError::InvalidArgument)
    }

    /// Sends one ADU on the given slot.
    pub fn submit(
        &mut self,
        slot: usize,
        transaction_id: u16,
        adu: &AduView<'_>,
    ) -> Result<(), LinkError> {
        self.channel(slot)?.submit(transaction_id, adu)
    }

    /// Polls one slot; events are tagged with the slot index.
    pub fn poll<F>(&mut self, slot: usize, sink: &mut F) -> Result<(), LinkError>
    where
        F: FnMut(usize, FrameEvent<'_>),
    {
        self.channel(slot)?.poll(&mut |event| sink(slot, event))
    }

    /// Polls every active slot once.
    ///
    /// The sweep always visits all slots. Per-slot `Timeout` is not an
    /// error at this level; of the remaining failures, the first one seen
    /// is returned after the sweep completes.
    pub fn poll_all<F>(&mut self, sink: &mut F) -> Result<(), LinkError>
    where
        F: FnMut(usize, FrameEvent<'_>),
    {
        let mut result = Ok(());
        for slot in 0..self.slots.len() {
            let Some(channel) = self.slots[slot].as_mut() else {
                continue;
            };
            match channel.poll(&mut |event| sink(slot, event)) {
                Ok(()) | Err(LinkError::Timeout) => {}
                Err(err) if result.is_ok() => result = Err(err),
                Err(_) => {}
            }
        }
        result
    }
}

impl<T: Transport> Default for TcpChannelPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
