//! Client transaction engine.
//!
//! The engine owns a fixed pool of transaction slots and a bounded FIFO of
//! submissions, and keeps exactly one transaction on the wire at a time (TCP
//! responses are still matched by transaction id, so late or foreign frames
//! are dropped rather than mis-delivered; RTU and ASCII have no transaction
//! id at all, which is why those links cannot multiplex).
//!
//! Terminal outcomes are delivered as [`Completion`] events through the sink
//! passed to [`ModbusClient::poll_with`], exactly once per transaction. The
//! one exception is [`ModbusClient::cancel`], whose `Ok(())` return *is* the
//! terminal outcome for the cancelled transaction.

use std::collections::VecDeque;

use pollmod_core::frame::PAYLOAD_MAX;
use pollmod_core::AduView;
use pollmod_datalink::{FrameEvent, LinkError, Transport};
use tracing::{debug, trace};

use crate::link::{LinkKind, LinkLayer};

/// Ceiling for grown timeouts and retry backoffs, in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_WATCHDOG_MS: u64 = 5000;
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Engine-wide defaults; per-request values in [`RequestOptions`] override
/// the timeout and backoff.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub response_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    /// Hard deadline for a stuck transaction; zero disables the watchdog.
    pub watchdog_ms: u64,
    /// Transaction pool capacity, allocated once at construction.
    pub pool_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            watchdog_ms: DEFAULT_WATCHDOG_MS,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_response_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.response_timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn with_watchdog_ms(mut self, watchdog_ms: u64) -> Self {
        self.watchdog_ms = watchdog_ms;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }
}

/// One request submission.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions<'a> {
    pub unit_id: u8,
    pub function: u8,
    pub payload: &'a [u8],
    /// Response timeout override; `None` uses the engine default.
    pub timeout_ms: Option<u64>,
    /// Retry backoff override; `None` uses the engine default.
    pub retry_backoff_ms: Option<u64>,
    /// Retransmissions allowed after the first attempt.
    pub max_retries: u8,
    /// Queue at the front instead of the back.
    pub high_priority: bool,
}

impl<'a> RequestOptions<'a> {
    pub fn new(unit_id: u8, function: u8, payload: &'a [u8]) -> Self {
        Self {
            unit_id,
            function,
            payload,
            timeout_ms: None,
            retry_backoff_ms: None,
            max_retries: 0,
            high_priority: false,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = Some(backoff_ms);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn high_priority(mut self) -> Self {
        self.high_priority = true;
        self
    }
}

/// Handle to an outstanding transaction.
///
/// Tokens embed a generation counter, so a token kept after its transaction
/// completed never aliases a later transaction in the same pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnToken {
    slot: usize,
    generation: u32,
}

/// Terminal outcome of one transaction.
///
/// On success `function`/`payload` hold the response PDU, including Modbus
/// exception responses, which arrive as successful completions with bit 7
/// set in `function`. The payload borrow is only valid inside the sink call.
#[derive(Debug, Clone, Copy)]
pub struct Completion<'a> {
    pub token: TxnToken,
    pub unit_id: u8,
    pub function: u8,
    pub payload: &'a [u8],
    pub status: Result<(), LinkError>,
}

/// Counters accumulated over the life of a client; `metrics()` snapshots and
/// `reset_metrics()` zeroes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientMetrics {
    pub submitted: u64,
    pub completed: u64,
    pub responses: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub errors: u64,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Queued,
    Waiting,
    Backoff,
}

struct TransactionSlot {
    generation: u32,
    state: SlotState,
    unit_id: u8,
    function: u8,
    payload: [u8; PAYLOAD_MAX],
    payload_len: usize,
    tid: u16,
    base_timeout_ms: u64,
    retry_backoff_ms: u64,
    max_retries: u8,
    retry_count: u8,
    deadline: u64,
    watchdog_deadline: u64,
    next_attempt_ms: u64,
}

impl TransactionSlot {
    fn empty() -> Self {
        Self {
            generation: 0,
            state: SlotState::Free,
            unit_id: 0,
            function: 0,
            payload: [0; PAYLOAD_MAX],
            payload_len: 0,
            tid: 0,
            base_timeout_ms: 0,
            retry_backoff_ms: 0,
            max_retries: 0,
            retry_count: 0,
            deadline: 0,
            watchdog_deadline: 0,
            next_attempt_ms: 0,
        }
    }
}

fn release(slot: &mut TransactionSlot) {
    slot.state = SlotState::Free;
    slot.generation = slot.generation.wrapping_add(1);
    slot.tid = 0;
}

/// Doubles `base` once per retry, saturating at [`MAX_TIMEOUT_MS`].
fn grown(base: u64, retries: u8) -> u64 {
    let mut value = base.max(1);
    for _ in 0..retries {
        if value >= MAX_TIMEOUT_MS / 2 {
            return MAX_TIMEOUT_MS;
        }
        value *= 2;
    }
    value.min(MAX_TIMEOUT_MS)
}

/// Deterministic jitter: a delay in `[base - base/2, base]` derived from the
/// clock, the slot index and the retry ordinal. Keeps concurrent clients from
/// retrying in lockstep without needing a randomness source.
fn jittered(slot: usize, retry_count: u8, base: u64, now: u64) -> u64 {
    if base <= 1 {
        return 1;
    }
    let spread = (base / 2).max(1);
    let pseudo = (now ^ (now >> 7)) ^ ((slot as u64) << 3) ^ (u64::from(retry_count) * 131);
    let offset = pseudo % (spread + 1);
    ((base - spread) + offset).clamp(1, MAX_TIMEOUT_MS)
}

fn complete_error<F>(
    slots: &mut [TransactionSlot],
    idx: usize,
    current: &mut Option<usize>,
    metrics: &mut ClientMetrics,
    sink: &mut F,
    error: LinkError,
) where
    F: FnMut(Completion<'_>),
{
    match error {
        LinkError::Timeout => metrics.timeouts += 1,
        _ => metrics.errors += 1,
    }
    metrics.completed += 1;

    let slot = &slots[idx];
    let completion = Completion {
        token: TxnToken {
            slot: idx,
            generation: slot.generation,
        },
        unit_id: slot.unit_id,
        function: slot.function,
        payload: &[],
        status: Err(error),
    };
    debug!(unit_id = slot.unit_id, function = slot.function, %error, "transaction failed");
    sink(completion);

    release(&mut slots[idx]);
    if *current == Some(idx) {
        *current = None;
    }
}

fn fail_or_retry<F>(
    slots: &mut [TransactionSlot],
    idx: usize,
    current: &mut Option<usize>,
    metrics: &mut ClientMetrics,
    sink: &mut F,
    error: LinkError,
    now: u64,
) where
    F: FnMut(Completion<'_>),
{
    if slots[idx].retry_count >= slots[idx].max_retries {
        complete_error(slots, idx, current, metrics, sink, error);
        return;
    }

    let slot = &mut slots[idx];
    slot.retry_count += 1;
    metrics.retries += 1;
    let base = grown(slot.retry_backoff_ms, slot.retry_count - 1);
    let delay = jittered(idx, slot.retry_count, base, now);
    slot.next_attempt_ms = now + delay;
    slot.deadline = 0;
    slot.watchdog_deadline = 0;
    slot.state = SlotState::Backoff;
    debug!(
        retry = slot.retry_count,
        delay_ms = delay,
        %error,
        "retry scheduled"
    );
}

fn handle_frame_event<F>(
    event: FrameEvent<'_>,
    kind: LinkKind,
    now: u64,
    slots: &mut [TransactionSlot],
    current: &mut Option<usize>,
    metrics: &mut ClientMetrics,
    sink: &mut F,
) where
    F: FnMut(Completion<'_>),
{
    let Some(idx) = *current else {
        return;
    };

    match event {
        FrameEvent::Frame { transaction_id, adu } => {
            let slot = &slots[idx];
            if !matches!(slot.state, SlotState::Waiting | SlotState::Backoff) {
                return;
            }
            if kind == LinkKind::Tcp && transaction_id != Some(slot.tid) {
                trace!(
                    ?transaction_id,
                    expected = slot.tid,
                    "response with foreign transaction id dropped"
                );
                return;
            }

            metrics.bytes_rx += kind.wire_len(adu.pdu_len()) as u64;
            metrics.responses += 1;
            metrics.completed += 1;
            let completion = Completion {
                token: TxnToken {
                    slot: idx,
                    generation: slot.generation,
                },
                unit_id: adu.unit_id,
                function: adu.function,
                payload: adu.payload,
                status: Ok(()),
            };
            trace!(
                unit_id = adu.unit_id,
                function = adu.function,
                payload_len = adu.payload.len(),
                "response matched"
            );
            sink(completion);

            release(&mut slots[idx]);
            *current = None;
        }
        FrameEvent::Broken {
            transaction_id,
            error,
        } => {
            if slots[idx].state != SlotState::Waiting {
                return;
            }
            if kind == LinkKind::Tcp {
                if let Some(tid) = transaction_id {
                    if tid != slots[idx].tid {
                        return;
                    }
                }
            }
            fail_or_retry(slots, idx, current, metrics, sink, error, now);
        }
    }
}

/// Poll-driven Modbus client over one link.
///
/// RTU and ASCII wire formats carry no transaction id, so at most one
/// request is outstanding at a time; further submissions queue behind it.
pub struct ModbusClient<T: Transport> {
    link: LinkLayer<T>,
    config: ClientConfig,
    slots: Vec<TransactionSlot>,
    queue: VecDeque<usize>,
    current: Option<usize>,
    next_tid: u16,
    metrics: ClientMetrics,
    /// Cancelled transactions whose terminal completion has not been
    /// delivered yet: token plus the unit id and function it carried.
    cancelled: Vec<(TxnToken, u8, u8)>,
}

impl<T: Transport> ModbusClient<T> {
    pub fn new(link: LinkLayer<T>) -> Self {
        Self::with_config(link, ClientConfig::default())
    }

    pub fn with_config(link: LinkLayer<T>, config: ClientConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        let mut slots = Vec::with_capacity(pool_size);
        slots.resize_with(pool_size, TransactionSlot::empty);
        Self {
            link,
            config,
            slots,
            queue: VecDeque::with_capacity(pool_size),
            current: None,
            next_tid: 1,
            metrics: ClientMetrics::default(),
            cancelled: Vec::new(),
        }
    }

    pub fn config(&self) -> ClientConfig {
        self.config
    }

    /// The link's monotonic clock, in milliseconds.
    pub fn now(&self) -> u64 {
        self.link.now()
    }

    pub fn metrics(&self) -> ClientMetrics {
        self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = ClientMetrics::default();
    }

    /// True when nothing is in flight or queued.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    /// Transactions in flight plus queued.
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Queues one request and, when the link is free, sends it immediately.
    ///
    /// Fails synchronously with `NoResources` when the pool is exhausted and
    /// with the transport's error when an immediate send fails; in both
    /// cases no transaction is created.
    pub fn submit(&mut self, request: &RequestOptions<'_>) -> Result<TxnToken, LinkError> {
        if request.payload.len() > PAYLOAD_MAX {
            return Err(LinkError::InvalidArgument);
        }

        let idx = self
            .slots
            .iter()
            .position(|slot| slot.state == SlotState::Free)
            .ok_or(LinkError::NoResources)?;

        let slot = &mut self.slots[idx];
        slot.state = SlotState::Queued;
        slot.unit_id = request.unit_id;
        slot.function = request.function;
        slot.payload[..request.payload.len()].copy_from_slice(request.payload);
        slot.payload_len = request.payload.len();
        slot.tid = 0;
        slot.base_timeout_ms = request
            .timeout_ms
            .unwrap_or(self.config.response_timeout_ms)
            .max(1);
        slot.retry_backoff_ms = request
            .retry_backoff_ms
            .unwrap_or(self.config.retry_backoff_ms)
            .max(1);
        slot.max_retries = request.max_retries;
        slot.retry_count = 0;
        slot.deadline = 0;
        slot.watchdog_deadline = 0;
        slot.next_attempt_ms = 0;
        let token = TxnToken {
            slot: idx,
            generation: slot.generation,
        };

        let immediate = self.current.is_none() && self.queue.is_empty();
        if immediate {
            if let Err(err) = self.attempt_send(idx) {
                release(&mut self.slots[idx]);
                return Err(err);
            }
            self.current = Some(idx);
        } else if request.high_priority {
            self.queue.push_front(idx);
        } else {
            self.queue.push_back(idx);
        }

        self.metrics.submitted += 1;
        trace!(
            unit_id = request.unit_id,
            function = request.function,
            queued = !immediate,
            "request submitted"
        );
        Ok(token)
    }

    /// Cancels a transaction. The next [`poll_with`](Self::poll_with)
    /// delivers its terminal `Completion` with a `Cancelled` status.
    /// Idempotent once the transaction has completed (a stale token is a
    /// no-op).
    pub fn cancel(&mut self, token: TxnToken) -> Result<(), LinkError> {
        let slot = self
            .slots
            .get_mut(token.slot)
            .ok_or(LinkError::InvalidArgument)?;
        if slot.generation != token.generation || slot.state == SlotState::Free {
            return Ok(());
        }

        let (unit_id, function) = (slot.unit_id, slot.function);
        release(slot);
        self.cancelled.push((token, unit_id, function));
        self.metrics.cancelled += 1;
        self.metrics.completed += 1;
        if self.current == Some(token.slot) {
            self.current = None;
        }
        self.queue.retain(|&idx| idx != token.slot);
        debug!(slot = token.slot, "transaction cancelled");
        Ok(())
    }

    /// Drives the link and the transaction timers.
    ///
    /// Every terminal outcome, cancellation included, is delivered to `sink`
    /// as exactly one [`Completion`]; its payload borrow is only valid
    /// inside the sink call. The returned error, if any, is the link's poll
    /// status after it has already been fed into the retry machinery.
    pub fn poll_with<F>(&mut self, sink: &mut F) -> Result<(), LinkError>
    where
        F: FnMut(Completion<'_>),
    {
        for (token, unit_id, function) in self.cancelled.drain(..) {
            sink(Completion {
                token,
                unit_id,
                function,
                payload: &[],
                status: Err(LinkError::Cancelled),
            });
        }

        let now = self.link.now();
        let kind = self.link.kind();

        let Self {
            link,
            slots,
            current,
            metrics,
            ..
        } = self;
        let link_result = link.poll(&mut |event| {
            handle_frame_event(event, kind, now, slots, current, metrics, sink);
        });

        let now = self.link.now();
        if let Some(idx) = self.current {
            match self.slots[idx].state {
                SlotState::Backoff if now >= self.slots[idx].next_attempt_ms => {
                    if let Err(err) = self.attempt_send(idx) {
                        let Self {
                            slots,
                            current,
                            metrics,
                            ..
                        } = self;
                        complete_error(slots, idx, current, metrics, sink, err);
                    }
                }
                SlotState::Waiting => {
                    let slot = &self.slots[idx];
                    if now >= slot.deadline {
                        let Self {
                            slots,
                            current,
                            metrics,
                            ..
                        } = self;
                        fail_or_retry(slots, idx, current, metrics, sink, LinkError::Timeout, now);
                    } else if slot.watchdog_deadline > 0 && now >= slot.watchdog_deadline {
                        let Self {
                            slots,
                            current,
                            metrics,
                            ..
                        } = self;
                        complete_error(
                            slots,
                            idx,
                            current,
                            metrics,
                            sink,
                            LinkError::Transport("watchdog expired"),
                        );
                    }
                }
                _ => {}
            }
        }

        if self.current.is_none() {
            self.start_next(sink);
        }

        link_result
    }

    fn start_next<F>(&mut self, sink: &mut F)
    where
        F: FnMut(Completion<'_>),
    {
        while self.current.is_none() {
            let Some(idx) = self.queue.pop_front() else {
                return;
            };
            if self.slots[idx].state != SlotState::Queued {
                continue;
            }
            match self.attempt_send(idx) {
                Ok(()) => self.current = Some(idx),
                Err(err) => {
                    let Self {
                        slots,
                        current,
                        metrics,
                        ..
                    } = self;
                    complete_error(slots, idx, current, metrics, sink, err);
                }
            }
        }
    }

    /// Sends the stored request with a timeout grown by the retry count.
    fn attempt_send(&mut self, idx: usize) -> Result<(), LinkError> {
        let now = self.link.now();
        let kind = self.link.kind();

        if kind == LinkKind::Tcp && self.slots[idx].tid == 0 {
            self.slots[idx].tid = self.next_tid;
            // Transaction id zero stays reserved for "unassigned".
            self.next_tid = if self.next_tid == u16::MAX {
                1
            } else {
                self.next_tid + 1
            };
        }

        let slot = &self.slots[idx];
        let adu = AduView::new(
            slot.unit_id,
            slot.function,
            &slot.payload[..slot.payload_len],
        );
        let tid = slot.tid;
        let timeout = grown(slot.base_timeout_ms, slot.retry_count);
        self.link.submit(tid, &adu)?;
        self.metrics.bytes_tx += kind.wire_len(adu.pdu_len()) as u64;

        let watchdog_ms = self.config.watchdog_ms;
        let slot = &mut self.slots[idx];
        slot.state = SlotState::Waiting;
        slot.deadline = now + timeout;
        slot.watchdog_deadline = if watchdog_ms > 0 { now + watchdog_ms } else { 0 };
        slot.next_attempt_ms = 0;
        trace!(
            unit_id = slot.unit_id,
            function = slot.function,
            tid,
            timeout_ms = timeout,
            attempt = slot.retry_count + 1,
            "request sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollmod_datalink::SimTransport;

    fn rtu_client(config: ClientConfig) -> (ModbusClient<SimTransport>, SimTransport) {
        let transport = SimTransport::new();
        let handle = transport.clone();
        (
            ModbusClient::with_config(LinkLayer::rtu(transport), config),
            handle,
        )
    }

    #[test]
    fn submit_sends_immediately_when_idle() {
        let (mut client, sim) = rtu_client(ClientConfig::default());
        let req = RequestOptions::new(0x11, 0x03, &[0x00, 0x6B, 0x00, 0x03]);
        client.submit(&req).unwrap();
        assert_eq!(
            sim.take_tx(),
            vec![0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]
        );
        assert_eq!(client.pending(), 1);
        assert!(!client.is_idle());
    }

    #[test]
    fn pool_exhaustion_is_synchronous() {
        let (mut client, _sim) = rtu_client(ClientConfig::default().with_pool_size(2));
        let req = RequestOptions::new(1, 0x03, &[0x00, 0x00, 0x00, 0x01]);
        client.submit(&req).unwrap();
        client.submit(&req).unwrap();
        assert_eq!(client.submit(&req).unwrap_err(), LinkError::NoResources);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let (mut client, _sim) = rtu_client(ClientConfig::default());
        let payload = [0u8; PAYLOAD_MAX + 1];
        let req = RequestOptions::new(1, 0x03, &payload);
        assert_eq!(client.submit(&req).unwrap_err(), LinkError::InvalidArgument);
    }

    #[test]
    fn failed_immediate_send_consumes_no_slot() {
        let (mut client, sim) = rtu_client(ClientConfig::default().with_pool_size(1));
        sim.fail_next_send(LinkError::Transport("down"));
        let req = RequestOptions::new(1, 0x03, &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(
            client.submit(&req).unwrap_err(),
            LinkError::Transport("down")
        );
        assert!(client.is_idle());
        // The slot is free again.
        client.submit(&req).unwrap();
    }

    #[test]
    fn high_priority_jumps_the_queue() {
        let (mut client, sim) = rtu_client(
            ClientConfig::default()
                .with_pool_size(4)
                .with_response_timeout_ms(50),
        );
        let first = RequestOptions::new(1, 0x03, &[0x00, 0x00, 0x00, 0x01]);
        let second = RequestOptions::new(2, 0x03, &[0x00, 0x00, 0x00, 0x01]);
        let urgent = RequestOptions::new(3, 0x03, &[0x00, 0x00, 0x00, 0x01]).high_priority();

        client.submit(&first).unwrap();
        client.submit(&second).unwrap();
        client.submit(&urgent).unwrap();
        sim.take_tx();

        // Let the first transaction time out and the next send happen.
        sim.advance(51);
        client.poll_with(&mut |_| {}).unwrap();
        let sent = sim.take_tx();
        assert_eq!(sent[0], 3, "high-priority request goes out next");
    }

    #[test]
    fn cancel_is_idempotent_after_completion() {
        let (mut client, _sim) = rtu_client(ClientConfig::default());
        let req = RequestOptions::new(1, 0x03, &[0x00, 0x00, 0x00, 0x01]);
        let token = client.submit(&req).unwrap();
        client.cancel(token).unwrap();
        assert!(client.is_idle());
        assert_eq!(client.metrics().cancelled, 1);

        // Second cancel with the same token is a no-op.
        client.cancel(token).unwrap();
        assert_eq!(client.metrics().cancelled, 1);
    }

    #[test]
    fn cancel_delivers_one_terminal_completion() {
        let (mut client, _sim) = rtu_client(ClientConfig::default());
        let token = client
            .submit(&RequestOptions::new(1, 0x03, &[0x00, 0x00, 0x00, 0x01]))
            .unwrap();
        client.cancel(token).unwrap();

        let mut completions = Vec::new();
        client
            .poll_with(&mut |completion: Completion<'_>| {
                completions.push((completion.token, completion.status));
            })
            .unwrap();
        assert_eq!(completions, vec![(token, Err(LinkError::Cancelled))]);

        // Delivered exactly once; later polls stay quiet.
        client
            .poll_with(&mut |_| panic!("no further completion expected"))
            .unwrap();
    }

    #[test]
    fn grown_doubles_and_saturates() {
        assert_eq!(grown(1000, 0), 1000);
        assert_eq!(grown(1000, 2), 4000);
        assert_eq!(grown(1000, 20), MAX_TIMEOUT_MS);
        assert_eq!(grown(0, 0), 1);
    }

    #[test]
    fn jitter_stays_in_window() {
        for now in [0u64, 17, 1000, 65_537] {
            for retry in 1..=5u8 {
                let delay = jittered(3, retry, 800, now);
                assert!((400..=800).contains(&delay), "delay {delay} out of window");
            }
        }
    }
}
