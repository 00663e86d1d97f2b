//! [`RequestEngine`] adapter over [`ModbusClient`], so a [`crate::Supervisor`]
//! can drive a real link.

use pollmod_datalink::{LinkError, Transport};
use tracing::trace;

use crate::autoheal::{Pdu, RequestEngine};
use crate::client::{ModbusClient, RequestOptions, TxnToken};

/// Wraps a [`ModbusClient`] into the one-request-at-a-time engine shape the
/// supervisor expects. Link-level errors that the client is already retrying
/// internally are not surfaced; only terminal completions are.
pub struct SupervisedClient<T: Transport> {
    client: ModbusClient<T>,
    outstanding: Option<TxnToken>,
    response: Option<Pdu>,
}

impl<T: Transport> SupervisedClient<T> {
    pub fn new(client: ModbusClient<T>) -> Self {
        Self {
            client,
            outstanding: None,
            response: None,
        }
    }

    pub fn client(&self) -> &ModbusClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ModbusClient<T> {
        &mut self.client
    }

    pub fn into_inner(self) -> ModbusClient<T> {
        self.client
    }
}

impl<T: Transport> RequestEngine for SupervisedClient<T> {
    fn submit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if frame.len() < 2 {
            return Err(LinkError::InvalidArgument);
        }
        if self.outstanding.is_some() {
            return Err(LinkError::Busy);
        }
        let request = RequestOptions::new(frame[0], frame[1], &frame[2..]);
        let token = self.client.submit(&request)?;
        self.outstanding = Some(token);
        self.response = None;
        Ok(())
    }

    fn step(&mut self, budget: usize) -> Result<(), LinkError> {
        let Some(token) = self.outstanding else {
            return Ok(());
        };

        let mut completed = false;
        let mut failure = None;
        for _ in 0..budget.max(1) {
            let response = &mut self.response;
            let poll_status = self.client.poll_with(&mut |completion| {
                if completion.token != token {
                    return;
                }
                completed = true;
                match completion.status {
                    Ok(()) => {
                        *response = Pdu::new(
                            completion.unit_id,
                            completion.function,
                            completion.payload,
                        )
                        .ok();
                    }
                    Err(error) => failure = Some(error),
                }
            });
            // Link poll errors have already been fed into the client's own
            // retry machinery; only terminal completions matter here.
            if let Err(error) = poll_status {
                trace!(%error, "link poll error");
            }
            if completed {
                break;
            }
        }

        if completed {
            self.outstanding = None;
            if let Some(error) = failure {
                return Err(error);
            }
        }
        Ok(())
    }

    fn take_pdu(&mut self) -> Option<Pdu> {
        self.response.take()
    }

    fn now(&self) -> u64 {
        self.client.now()
    }
}
