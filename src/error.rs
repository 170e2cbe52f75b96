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

//! Error types for match escrow operations.

use crate::base::{MatchId, Side};
use crate::record::MatchStatus;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by (or while reaching) the ledger node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Node is offline or the transport failed
    #[error("ledger node unavailable: {0}")]
    Unavailable(String),

    /// Call did not complete within the configured bound
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    /// Node answered with an RPC error
    #[error("ledger node rejected the call: {0}")]
    Rejected(String),
}

/// Bad input, rejected before any state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Stake is zero or negative
    #[error("stake must be positive")]
    NonPositiveStake,

    /// A payout address is empty
    #[error("{0} payout address is required")]
    MissingAddress(Side),

    /// Reported result is not one of white, black or draw
    #[error("invalid result '{0}'; must be 'white', 'black' or 'draw'")]
    InvalidResult(String),
}

/// Escrow operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown match id
    #[error("match {0} not found")]
    NotFound(MatchId),

    /// Settlement attempted on a match that is already settled or aborted
    #[error("match already {0}")]
    InvalidState(MatchStatus),

    /// A different settlement already disbursed part of its plan
    #[error("a partially disbursed settlement is pending for this match")]
    SettlementInProgress,

    /// Abort requested but neither side deposited anything
    #[error("no deposits to refund")]
    NothingToRefund,

    /// Ledger id collision on insert
    #[error("match {0} already exists")]
    DuplicateMatch(MatchId),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
