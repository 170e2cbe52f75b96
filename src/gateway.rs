// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ledger node interface.
//!
//! The escrow core never talks to a node directly. It goes through
//! [`LedgerGateway`], whose every call is fallible and possibly slow.
//! [`TimeoutGateway`] puts an upper bound on how long any call may block.

use crate::base::{Address, TxId};
use crate::error::GatewayError;
use crossbeam::channel::{self, RecvTimeoutError};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Confirmations a deposit needs before it counts.
pub const MIN_CONFIRMATIONS: u32 = 1;

/// Operations the escrow needs from a ledger node.
pub trait LedgerGateway: Send + Sync {
    /// Allocates a fresh wallet address under `label`.
    fn new_address(&self, label: &str) -> Result<Address, GatewayError>;

    /// Cumulative amount ever received at `address` with at least
    /// `min_confirmations` confirmations.
    fn received_by_address(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Decimal, GatewayError>;

    /// Sends `amount` from the node wallet to `address`.
    fn send_to(&self, address: &Address, amount: Decimal) -> Result<TxId, GatewayError>;
}

impl<G: LedgerGateway + ?Sized> LedgerGateway for Arc<G> {
    fn new_address(&self, label: &str) -> Result<Address, GatewayError> {
        (**self).new_address(label)
    }

    fn received_by_address(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Decimal, GatewayError> {
        (**self).received_by_address(address, min_confirmations)
    }

    fn send_to(&self, address: &Address, amount: Decimal) -> Result<TxId, GatewayError> {
        (**self).send_to(address, amount)
    }
}

/// Gateway adapter that bounds every call by a timeout.
///
/// Each call runs on its own worker thread; the caller waits on a channel
/// for at most `timeout`. A call that overruns is abandoned (its thread
/// finishes in the background) and reported as [`GatewayError::Timeout`].
///
/// A timed-out `send_to` has an unknown outcome on the node side.
#[derive(Debug)]
pub struct TimeoutGateway<G> {
    inner: Arc<G>,
    timeout: Duration,
}

impl<G> TimeoutGateway<G>
where
    G: LedgerGateway + 'static,
{
    pub fn new(inner: Arc<G>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&G) -> Result<T, GatewayError> + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        let gateway = Arc::clone(&self.inner);
        thread::Builder::new()
            .name(format!("ledger-{op}"))
            .spawn(move || {
                // Receiver is gone if the caller already timed out.
                let _ = tx.send(f(&gateway));
            })
            .map_err(|e| GatewayError::Unavailable(format!("cannot spawn {op} call: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(op, timeout = ?self.timeout, "ledger call timed out");
                Err(GatewayError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(GatewayError::Unavailable(format!("{op} call aborted")))
            }
        }
    }
}

impl<G> LedgerGateway for TimeoutGateway<G>
where
    G: LedgerGateway + 'static,
{
    fn new_address(&self, label: &str) -> Result<Address, GatewayError> {
        let label = label.to_string();
        self.call("new_address", move |g| g.new_address(&label))
    }

    fn received_by_address(
        &self,
        address: &Address,
        min_confirmations: u32,
    ) -> Result<Decimal, GatewayError> {
        let address = address.clone();
        self.call("received_by_address", move |g| {
            g.received_by_address(&address, min_confirmations)
        })
    }

    fn send_to(&self, address: &Address, amount: Decimal) -> Result<TxId, GatewayError> {
        let address = address.clone();
        self.call("send_to", move |g| g.send_to(&address, amount))
    }
}
