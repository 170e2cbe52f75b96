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

//! In-process ledger node.
//!
//! [`SimulatedLedger`] implements [`LedgerGateway`] entirely in memory. It is
//! used by the scenario CLI and the test suites, and supports fault injection:
//! going offline, failing sends after a number of successes, and adding latency
//! to every call.

use crate::base::{Address, TxId};
use crate::error::GatewayError;
use crate::gateway::LedgerGateway;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// A payment the simulated node sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPayment {
    pub tx_id: TxId,
    pub address: Address,
    pub amount: Decimal,
}

#[derive(Debug)]
pub struct SimulatedLedger {
    /// Cumulative amount received per address.
    received: DashMap<Address, Decimal>,
    /// Sends in issuance order.
    sent: Mutex<Vec<SentPayment>>,
    next_address: AtomicU64,
    next_tx: AtomicU64,
    online: AtomicBool,
    /// Sends allowed before every further send fails. `None` is unlimited.
    sends_remaining: Mutex<Option<usize>>,
    latency: Mutex<Duration>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self {
            received: DashMap::new(),
            sent: Mutex::new(Vec::new()),
            next_address: AtomicU64::new(1),
            next_tx: AtomicU64::new(1),
            online: AtomicBool::new(true),
            sends_remaining: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Records an incoming payment of `amount` at `address`.
    pub fn credit(&self, address: &Address, amount: Decimal) {
        *self.received.entry(address.clone()).or_insert(Decimal::ZERO) += amount;
    }

    /// Overwrites the received total, e.g. to simulate a stale read.
    pub fn set_received(&self, address: &Address, total: Decimal) {
        self.received.insert(address.clone(), total);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Lets `n` more sends succeed; later sends fail until cleared.
    pub fn fail_sends_after(&self, n: usize) {
        *self.sends_remaining.lock() = Some(n);
    }

    pub fn clear_send_failures(&self) {
        *self.sends_remaining.lock() = None;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Every successful send so far, oldest first.
    pub fn sent(&self) -> Vec<SentPayment> {
        self.sent.lock().clone()
    }

    /// Sum of everything sent to `address`.
    pub fn total_sent_to(&self, address: &Address) -> Decimal {
        self.sent
            .lock()
            .iter()
            .filter(|p| &p.address == address)
            .map(|p| p.amount)
            .sum()
    }

    fn enter(&self) -> Result<(), GatewayError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerGateway for SimulatedLedger {
    fn new_address(&self, label: &str) -> Result<Address, GatewayError> {
        self.enter()?;
        let n = self.next_address.fetch_add(1, Ordering::Relaxed);
        Ok(Address(format!("{label}_{n}")))
    }

    fn received_by_address(
        &self,
        address: &Address,
        _min_confirmations: u32,
    ) -> Result<Decimal, GatewayError> {
        self.enter()?;
        Ok(self
            .received
            .get(address)
            .map(|total| *total)
            .unwrap_or(Decimal::ZERO))
    }

    fn send_to(&self, address: &Address, amount: Decimal) -> Result<TxId, GatewayError> {
        self.enter()?;
        if amount <= Decimal::ZERO {
            return Err(GatewayError::Rejected("Invalid amount".into()));
        }
        {
            let mut remaining = self.sends_remaining.lock();
            match remaining.as_mut() {
                Some(0) => return Err(GatewayError::Unavailable("send failed".into())),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        let tx_id = TxId(format!("tx-{}", self.next_tx.fetch_add(1, Ordering::Relaxed)));
        self.sent.lock().push(SentPayment {
            tx_id: tx_id.clone(),
            address: address.clone(),
            amount,
        });
        Ok(tx_id)
    }
}
