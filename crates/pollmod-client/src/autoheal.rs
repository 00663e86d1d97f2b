//! Auto-heal supervisor: retry-then-trip wrapper around a request engine.
//!
//! The supervisor owns one request at a time. Failures from the engine are
//! retried with exponential backoff until the retry budget is exhausted, at
//! which point a circuit breaker opens and blocks new submissions for a
//! cooldown period. Every terminal outcome is either a full PDU available
//! through [`Supervisor::take_pdu`] or an explicit give-up notification;
//! nothing partial ever reaches the application.

use pollmod_core::frame::PAYLOAD_MAX;
use pollmod_datalink::LinkError;
use tracing::{debug, trace};

/// Frame capacity of the supervisor's private buffer: unit id, function and
/// a maximal payload.
pub const FRAME_CAPACITY: usize = PAYLOAD_MAX + 2;

pub const DEFAULT_MAX_RETRIES: u8 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8000;
pub const DEFAULT_COOLDOWN_MS: u64 = 10_000;

/// The engine the supervisor drives. [`crate::SupervisedClient`] adapts
/// [`crate::ModbusClient`] to this trait; tests substitute stubs.
pub trait RequestEngine {
    /// Starts one request. The frame is `unit_id | function | payload`.
    fn submit(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Makes progress on the outstanding request. An `Err` is the request's
    /// terminal failure; `Ok` with a PDU available from [`take_pdu`] is its
    /// terminal success; `Ok` without one means "still waiting".
    ///
    /// [`take_pdu`]: RequestEngine::take_pdu
    fn step(&mut self, budget: usize) -> Result<(), LinkError>;

    /// Returns and clears the response of the last completed request.
    fn take_pdu(&mut self) -> Option<Pdu>;

    /// Monotonic milliseconds.
    fn now(&self) -> u64;
}

/// An owned response: unit id, function code and payload copied out of the
/// frame that carried them.
#[derive(Debug, Clone, Copy)]
pub struct Pdu {
    unit_id: u8,
    function: u8,
    payload: [u8; PAYLOAD_MAX],
    payload_len: usize,
}

impl Pdu {
    pub fn new(unit_id: u8, function: u8, payload: &[u8]) -> Result<Self, LinkError> {
        if payload.len() > PAYLOAD_MAX {
            return Err(LinkError::InvalidArgument);
        }
        let mut buf = [0u8; PAYLOAD_MAX];
        buf[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            unit_id,
            function,
            payload: buf,
            payload_len: payload.len(),
        })
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn function(&self) -> u8 {
        self.function
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }
}

/// Retry and circuit-breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Attempts allowed per request cycle before the circuit trips.
    pub max_retries: u8,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// How long the circuit stays open after a give-up.
    pub cooldown_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

impl SupervisorConfig {
    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.initial_backoff_ms = backoff_ms;
        self
    }

    pub fn with_max_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.max_backoff_ms = backoff_ms;
        self
    }

    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }
}

/// Lifecycle phase, derived from the supervisor's internal flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Waiting,
    Scheduled,
    CircuitOpen,
}

/// Notifications delivered to the observer, in the order things happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealEvent {
    /// The frame went out to the engine. `attempt` counts from 1 within the
    /// current request cycle.
    Attempt { attempt: u32 },
    RetryScheduled { retry: u8, delay_ms: u64 },
    ResponseOk,
    GiveUp { retries: u8 },
    CircuitOpen { release_ms: u64 },
    CircuitClosed,
}

type Observer = Box<dyn FnMut(HealEvent)>;

pub struct Supervisor<E: RequestEngine> {
    engine: E,
    config: SupervisorConfig,
    observer: Option<Observer>,
    frame: [u8; FRAME_CAPACITY],
    frame_len: usize,
    request_valid: bool,
    waiting: bool,
    retry_count: u8,
    attempt_count: u32,
    next_retry_ms: u64,
    circuit_open: bool,
    circuit_release_ms: u64,
    last_pdu: Option<Pdu>,
}

impl<E: RequestEngine> Supervisor<E> {
    pub fn new(engine: E, config: SupervisorConfig) -> Result<Self, LinkError> {
        if config.max_retries == 0 {
            return Err(LinkError::InvalidArgument);
        }
        let mut config = config;
        config.initial_backoff_ms = config.initial_backoff_ms.max(1);
        config.max_backoff_ms = config.max_backoff_ms.max(config.initial_backoff_ms);
        Ok(Self {
            engine,
            config,
            observer: None,
            frame: [0; FRAME_CAPACITY],
            frame_len: 0,
            request_valid: false,
            waiting: false,
            retry_count: 0,
            attempt_count: 0,
            next_retry_ms: 0,
            circuit_open: false,
            circuit_release_ms: 0,
            last_pdu: None,
        })
    }

    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn state(&self) -> SupervisorState {
        if self.circuit_open {
            SupervisorState::CircuitOpen
        } else if self.waiting {
            SupervisorState::Waiting
        } else if self.request_valid {
            SupervisorState::Scheduled
        } else {
            SupervisorState::Idle
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        self.circuit_open
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Starts a new request cycle with `frame` (`unit_id | function |
    /// payload`).
    ///
    /// Returns `Busy` while the circuit is open and the cooldown has not
    /// elapsed, or while the previous request cycle is still in flight, and
    /// `NoResources` when the frame exceeds [`FRAME_CAPACITY`].
    pub fn submit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let now = self.engine.now();
        if self.circuit_open {
            if now >= self.circuit_release_ms {
                self.close_circuit();
            } else {
                return Err(LinkError::Busy);
            }
        }
        if self.waiting || self.request_valid {
            return Err(LinkError::Busy);
        }
        if frame.len() < 2 {
            return Err(LinkError::InvalidArgument);
        }
        if frame.len() > FRAME_CAPACITY {
            return Err(LinkError::NoResources);
        }

        self.frame[..frame.len()].copy_from_slice(frame);
        self.frame_len = frame.len();
        self.request_valid = true;
        self.retry_count = 0;
        self.attempt_count = 0;
        self.next_retry_ms = 0;
        self.last_pdu = None;
        self.attempt_send(now);
        Ok(())
    }

    /// Drives the engine and the supervisor timers. `budget` is passed
    /// through to the engine's `step`.
    pub fn step(&mut self, budget: usize) -> Result<(), LinkError> {
        let now = self.engine.now();
        if self.circuit_open {
            if now >= self.circuit_release_ms {
                self.close_circuit();
            } else {
                return Ok(());
            }
        }

        if self.waiting {
            match self.engine.step(budget) {
                Ok(()) => {
                    if let Some(pdu) = self.engine.take_pdu() {
                        self.waiting = false;
                        self.request_valid = false;
                        self.retry_count = 0;
                        self.next_retry_ms = 0;
                        self.last_pdu = Some(pdu);
                        trace!("response delivered");
                        self.emit(HealEvent::ResponseOk);
                    }
                }
                Err(error) => {
                    let now = self.engine.now();
                    self.schedule_retry(now, error);
                }
            }
            return Ok(());
        }

        if self.request_valid && self.next_retry_ms != 0 && now >= self.next_retry_ms {
            self.attempt_send(now);
        }
        Ok(())
    }

    /// Returns and clears the last delivered response.
    pub fn take_pdu(&mut self) -> Option<Pdu> {
        self.last_pdu.take()
    }

    /// Force-clears all state back to idle, closing the circuit if open.
    pub fn reset(&mut self) {
        self.circuit_open = false;
        self.circuit_release_ms = 0;
        self.request_valid = false;
        self.waiting = false;
        self.frame_len = 0;
        self.retry_count = 0;
        self.attempt_count = 0;
        self.next_retry_ms = 0;
        self.last_pdu = None;
    }

    fn attempt_send(&mut self, now: u64) {
        match self.engine.submit(&self.frame[..self.frame_len]) {
            Ok(()) => {
                self.waiting = true;
                self.next_retry_ms = 0;
                self.attempt_count += 1;
                let attempt = self.attempt_count;
                trace!(attempt, "request attempt");
                self.emit(HealEvent::Attempt { attempt });
            }
            Err(LinkError::Busy) => {
                // Engine has no room right now; try again after the initial
                // backoff without charging the retry budget.
                self.next_retry_ms = now + self.config.initial_backoff_ms;
                trace!(next_retry_ms = self.next_retry_ms, "engine busy, deferred");
            }
            Err(error) => self.schedule_retry(now, error),
        }
    }

    fn schedule_retry(&mut self, now: u64, error: LinkError) {
        self.waiting = false;
        self.retry_count = self.retry_count.saturating_add(1);

        if self.retry_count >= self.config.max_retries {
            let retries = self.retry_count;
            self.request_valid = false;
            self.next_retry_ms = 0;
            debug!(retries, %error, "giving up");
            self.emit(HealEvent::GiveUp { retries });
            self.open_circuit(now);
            return;
        }

        let backoff = self.backoff_ms();
        self.next_retry_ms = now + backoff;
        debug!(
            retry = self.retry_count,
            delay_ms = backoff,
            %error,
            "retry scheduled"
        );
        self.emit(HealEvent::RetryScheduled {
            retry: self.retry_count,
            delay_ms: backoff,
        });
    }

    fn backoff_ms(&self) -> u64 {
        let shift = u32::from(self.retry_count.min(63));
        let grown = self
            .config
            .initial_backoff_ms
            .checked_shl(shift)
            .unwrap_or(u64::MAX);
        grown.min(self.config.max_backoff_ms)
    }

    fn open_circuit(&mut self, now: u64) {
        self.circuit_open = true;
        self.circuit_release_ms = now + self.config.cooldown_ms;
        self.waiting = false;
        let release_ms = self.circuit_release_ms;
        debug!(release_ms, "circuit opened");
        self.emit(HealEvent::CircuitOpen { release_ms });
    }

    fn close_circuit(&mut self) {
        self.circuit_open = false;
        self.circuit_release_ms = 0;
        self.retry_count = 0;
        self.attempt_count = 0;
        debug!("circuit closed");
        self.emit(HealEvent::CircuitClosed);
    }

    fn emit(&mut self, event: HealEvent) {
        if let Some(observer) = &mut self.observer {
            observer(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct StubEngine {
        now: u64,
        submit_results: VecDeque<Result<(), LinkError>>,
        step_results: VecDeque<Result<(), LinkError>>,
        pdu: Option<Pdu>,
        submitted: Vec<Vec<u8>>,
    }

    impl RequestEngine for StubEngine {
        fn submit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
            self.submitted.push(frame.to_vec());
            self.submit_results.pop_front().unwrap_or(Ok(()))
        }

        fn step(&mut self, _budget: usize) -> Result<(), LinkError> {
            self.step_results.pop_front().unwrap_or(Ok(()))
        }

        fn take_pdu(&mut self) -> Option<Pdu> {
            self.pdu.take()
        }

        fn now(&self) -> u64 {
            self.now
        }
    }

    fn supervisor(config: SupervisorConfig) -> Supervisor<StubEngine> {
        Supervisor::new(StubEngine::default(), config).unwrap()
    }

    fn events(sup: &mut Supervisor<StubEngine>) -> Rc<RefCell<Vec<HealEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        sup.set_observer(Box::new(move |event| sink.borrow_mut().push(event)));
        log
    }

    #[test]
    fn zero_max_retries_is_rejected() {
        let err = Supervisor::new(
            StubEngine::default(),
            SupervisorConfig::default().with_max_retries(0),
        )
        .map(|_| ())
        .unwrap_err();
        assert_eq!(err, LinkError::InvalidArgument);
    }

    #[test]
    fn success_cycle_delivers_one_pdu() {
        let mut sup = supervisor(SupervisorConfig::default());
        let log = events(&mut sup);

        sup.submit(&[0x11, 0x03, 0x00, 0x00]).unwrap();
        assert_eq!(sup.state(), SupervisorState::Waiting);

        sup.engine_mut().pdu = Some(Pdu::new(0x11, 0x03, &[0x02, 0xAB, 0xCD]).unwrap());
        sup.step(1).unwrap();
        assert_eq!(sup.state(), SupervisorState::Idle);

        let pdu = sup.take_pdu().expect("response available");
        assert_eq!(pdu.unit_id(), 0x11);
        assert_eq!(pdu.function(), 0x03);
        assert_eq!(pdu.payload(), &[0x02, 0xAB, 0xCD]);
        assert!(sup.take_pdu().is_none(), "one-shot read");

        assert_eq!(
            log.borrow().as_slice(),
            &[HealEvent::Attempt { attempt: 1 }, HealEvent::ResponseOk]
        );
    }

    #[test]
    fn submit_while_a_cycle_is_in_flight_is_busy() {
        let mut sup = supervisor(SupervisorConfig::default());
        sup.submit(&[0x11, 0x03, 0x00, 0x00]).unwrap();
        assert_eq!(sup.state(), SupervisorState::Waiting);

        assert_eq!(
            sup.submit(&[0x22, 0x03, 0x00, 0x00]).unwrap_err(),
            LinkError::Busy
        );

        // The first cycle still completes with its own response and the
        // engine never saw the rejected frame.
        sup.engine_mut().pdu = Some(Pdu::new(0x11, 0x03, &[0x02, 0x00, 0x01]).unwrap());
        sup.step(1).unwrap();
        let pdu = sup.take_pdu().expect("first response");
        assert_eq!(pdu.unit_id(), 0x11);
        assert_eq!(sup.engine().submitted.len(), 1);
        assert_eq!(sup.engine().submitted[0][0], 0x11);

        // Idle again, a new cycle is accepted.
        sup.submit(&[0x22, 0x03, 0x00, 0x00]).unwrap();
        assert_eq!(sup.engine().submitted[1][0], 0x22);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = SupervisorConfig::default()
            .with_max_retries(5)
            .with_initial_backoff_ms(100)
            .with_max_backoff_ms(350);
        let mut sup = supervisor(config);
        let log = events(&mut sup);

        sup.submit(&[1, 3]).unwrap();
        for _ in 0..2 {
            sup.engine_mut().step_results.push_back(Err(LinkError::Timeout));
            sup.step(1).unwrap();
            // Re-arm: backoff elapsed, resend.
            sup.engine_mut().now += 1000;
            sup.step(1).unwrap();
        }

        let delays: Vec<u64> = log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                HealEvent::RetryScheduled { delay_ms, .. } => Some(*delay_ms),
                _ => None,
            })
            .collect();
        assert_eq!(delays, vec![200, 350]);
    }

    #[test]
    fn give_up_opens_circuit_and_blocks_submit() {
        let config = SupervisorConfig::default()
            .with_max_retries(2)
            .with_initial_backoff_ms(10)
            .with_cooldown_ms(500);
        let mut sup = supervisor(config);
        let log = events(&mut sup);

        sup.submit(&[1, 3]).unwrap();
        for _ in 0..2 {
            sup.engine_mut().step_results.push_back(Err(LinkError::Timeout));
            sup.step(1).unwrap();
            sup.engine_mut().now += 100;
            sup.step(1).unwrap();
        }

        assert_eq!(sup.state(), SupervisorState::CircuitOpen);
        assert_eq!(sup.submit(&[1, 3]).unwrap_err(), LinkError::Busy);

        let seen = log.borrow();
        assert!(seen.contains(&HealEvent::GiveUp { retries: 2 }));
        assert!(matches!(seen.last(), Some(HealEvent::CircuitOpen { .. })));
    }

    #[test]
    fn cooldown_closes_circuit_via_step() {
        let config = SupervisorConfig::default()
            .with_max_retries(1)
            .with_cooldown_ms(500);
        let mut sup = supervisor(config);

        sup.submit(&[1, 3]).unwrap();
        sup.engine_mut().step_results.push_back(Err(LinkError::Timeout));
        sup.step(1).unwrap();
        assert!(sup.is_circuit_open());

        sup.engine_mut().now += 499;
        sup.step(1).unwrap();
        assert!(sup.is_circuit_open());

        sup.engine_mut().now += 1;
        sup.step(1).unwrap();
        assert!(!sup.is_circuit_open());
        assert_eq!(sup.state(), SupervisorState::Idle);
        sup.submit(&[1, 3]).unwrap();
        assert_eq!(sup.state(), SupervisorState::Waiting);
    }

    #[test]
    fn busy_engine_defers_without_charging_retries() {
        let config = SupervisorConfig::default().with_initial_backoff_ms(50);
        let mut sup = supervisor(config);

        sup.engine_mut().submit_results.push_back(Err(LinkError::Busy));
        sup.submit(&[1, 3]).unwrap();
        assert_eq!(sup.state(), SupervisorState::Scheduled);
        assert_eq!(sup.retry_count(), 0);
        assert_eq!(sup.submit(&[2, 3]).unwrap_err(), LinkError::Busy);

        sup.engine_mut().now += 50;
        sup.step(1).unwrap();
        assert_eq!(sup.state(), SupervisorState::Waiting);
        assert_eq!(sup.engine().submitted.len(), 2);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut sup = supervisor(SupervisorConfig::default());
        let frame = [0u8; FRAME_CAPACITY + 1];
        assert_eq!(sup.submit(&frame).unwrap_err(), LinkError::NoResources);
    }

    #[test]
    fn reset_returns_to_idle_from_any_phase() {
        let config = SupervisorConfig::default().with_max_retries(1);
        let mut sup = supervisor(config);
        sup.submit(&[1, 3]).unwrap();
        sup.engine_mut().step_results.push_back(Err(LinkError::Timeout));
        sup.step(1).unwrap();
        assert!(sup.is_circuit_open());

        sup.reset();
        assert_eq!(sup.state(), SupervisorState::Idle);
        sup.submit(&[1, 3]).unwrap();
    }
}
