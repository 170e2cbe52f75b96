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

//! Escrow engine configuration.

use crate::gateway::MIN_CONFIRMATIONS;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowConfig {
    /// Escrow addresses are labelled `<prefix>_white` / `<prefix>_black` on the node.
    pub address_label_prefix: String,
    /// Ticker used in under-deposit advisories.
    pub currency_ticker: String,
    /// Confirmations a deposit needs before it is counted.
    pub min_confirmations: u32,
    /// Upper bound for a single ledger node call.
    pub gateway_timeout: Duration,
}

impl EscrowConfig {
    pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn address_label(&self, side: crate::base::Side) -> String {
        format!("{}_{}", self.address_label_prefix, side)
    }
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            address_label_prefix: "pepchess".to_string(),
            currency_ticker: "PEP".to_string(),
            min_confirmations: MIN_CONFIRMATIONS,
            gateway_timeout: Self::DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}
