//! Poll-driven Modbus client engine with retries, cancellation and an
//! auto-heal supervisor.
//!
//! [`ModbusClient`] runs transactions over any of the datalink channels
//! ([`LinkLayer`] wraps RTU, ASCII and TCP behind one surface): it queues
//! submissions, matches responses, grows timeouts and backoffs across
//! retries, and reports exactly one terminal [`Completion`] per transaction.
//! [`Supervisor`] adds a circuit breaker on top for unattended operation,
//! driving any [`RequestEngine`]; [`SupervisedClient`] is the adapter that
//! makes a `ModbusClient` into one.
//!
//! Everything here is single-threaded and poll-driven. Nothing blocks; the
//! embedding application calls `poll_with`/`step` from its own loop.

#![forbid(unsafe_code)]

mod autoheal;
mod client;
mod link;
mod supervised;

pub use autoheal::{
    HealEvent, Pdu, RequestEngine, Supervisor, SupervisorConfig, SupervisorState,
    DEFAULT_COOLDOWN_MS, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MAX_RETRIES, FRAME_CAPACITY,
};
pub use client::{
    ClientConfig, ClientMetrics, Completion, ModbusClient, RequestOptions, TxnToken,
    DEFAULT_POOL_SIZE, DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_RETRY_BACKOFF_MS,
    DEFAULT_WATCHDOG_MS, MAX_TIMEOUT_MS,
};
pub use link::LinkLayer;
pub use supervised::SupervisedClient;

pub use pollmod_datalink::LinkError;
