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

//! Match records.
//!
//! Implemented State Machine
//!
//! ```text
//!  waiting_for_deposits ◄──confirmations──► ready_to_play
//!          │                                     │
//!          └──────────── abort / result ─────────┴──► settled | aborted
//! ```
//!
//! Polling only ever moves a match between the two non-terminal states.
//! Terminal states are reached through settlement and never left.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use match_escrow_rs::{Address, MatchId, MatchRecord, MatchStatus};
//!
//! let record = MatchRecord::new(
//!     MatchId::new(),
//!     dec!(10),
//!     [Address::new("white-payout"), Address::new("black-payout")],
//!     [Address::new("escrow-w"), Address::new("escrow-b")],
//! );
//! assert_eq!(record.status, MatchStatus::WaitingForDeposits);
//! ```

use crate::base::{Address, MatchId, Side, TxId};
use crate::error::ValidationError;
use crate::settlement::SettlementPlan;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    WaitingForDeposits,
    ReadyToPlay,
    Settled,
    Aborted,
}

impl MatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Settled | MatchStatus::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::WaitingForDeposits => "waiting_for_deposits",
            MatchStatus::ReadyToPlay => "ready_to_play",
            MatchStatus::Settled => "settled",
            MatchStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome recorded on a terminal match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    White,
    Black,
    Draw,
    Aborted,
}

/// Outcome a caller may report for a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedResult {
    White,
    Black,
    Draw,
}

impl ReportedResult {
    /// Winning side, `None` for a draw.
    pub fn winner(&self) -> Option<Side> {
        match self {
            ReportedResult::White => Some(Side::White),
            ReportedResult::Black => Some(Side::Black),
            ReportedResult::Draw => None,
        }
    }
}

impl From<ReportedResult> for MatchResult {
    fn from(result: ReportedResult) -> Self {
        match result {
            ReportedResult::White => MatchResult::White,
            ReportedResult::Black => MatchResult::Black,
            ReportedResult::Draw => MatchResult::Draw,
        }
    }
}

impl FromStr for ReportedResult {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "white" => Ok(ReportedResult::White),
            "black" => Ok(ReportedResult::Black),
            "draw" => Ok(ReportedResult::Draw),
            _ => Err(ValidationError::InvalidResult(s.to_string())),
        }
    }
}

/// Per-player half of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideState {
    /// Where winnings and refunds are sent.
    pub payout_address: Address,
    /// Where the player deposits their stake.
    pub escrow_address: Address,
    /// Last-known cumulative amount received at the escrow address.
    pub deposit_observed: Decimal,
    /// Cumulative amount above stake already sent back. Never decreases.
    pub extra_refunded: Decimal,
}

impl SideState {
    fn new(payout_address: Address, escrow_address: Address) -> Self {
        Self {
            payout_address,
            escrow_address,
            deposit_observed: Decimal::ZERO,
            extra_refunded: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub id: MatchId,
    pub stake: Decimal,
    pub white: SideState,
    pub black: SideState,
    /// Number of sides whose effective deposit meets the stake.
    pub confirmed_deposits: u8,
    pub status: MatchStatus,
    pub result: Option<MatchResult>,
    /// Every disbursement issued for this match, in issuance order.
    pub tx_ids: Vec<TxId>,
    /// Settlement plan that failed after disbursing some of its legs.
    pub pending_settlement: Option<SettlementPlan>,
}

impl MatchRecord {
    /// Creates a record in `waiting_for_deposits`.
    ///
    /// Addresses are given as `[white, black]`.
    pub fn new(
        id: MatchId,
        stake: Decimal,
        payout_addresses: [Address; 2],
        escrow_addresses: [Address; 2],
    ) -> Self {
        let [white_payout, black_payout] = payout_addresses;
        let [white_escrow, black_escrow] = escrow_addresses;
        Self {
            id,
            stake,
            white: SideState::new(white_payout, white_escrow),
            black: SideState::new(black_payout, black_escrow),
            confirmed_deposits: 0,
            status: MatchStatus::WaitingForDeposits,
            result: None,
            tx_ids: Vec::new(),
            pending_settlement: None,
        }
    }

    pub fn side(&self, side: Side) -> &SideState {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }

    /// Moves the match into a terminal state.
    pub(crate) fn terminalize(&mut self, status: MatchStatus, result: MatchResult) {
        debug_assert!(status.is_terminal(), "terminalize called with {status}");
        debug_assert!(
            !self.status.is_terminal(),
            "Invariant violated: match {} left terminal state {}",
            self.id,
            self.status
        );
        self.status = status;
        self.result = Some(result);
        self.pending_settlement = None;
    }

    /// Stores a fresh escrow total for `side` and returns what was kept.
    ///
    /// Once an overpayment has been refunded the stored total never drops
    /// below `stake + extra_refunded`; a lower read is stale.
    pub(crate) fn observe(&mut self, side: Side, fresh: Decimal) -> Decimal {
        let stake = self.stake;
        let state = self.side_mut(side);
        let floor = if state.extra_refunded > Decimal::ZERO {
            stake + state.extra_refunded
        } else {
            Decimal::ZERO
        };
        state.deposit_observed = fresh.max(floor);
        state.deposit_observed
    }

    pub(crate) fn assert_invariants(&self) {
        debug_assert!(
            self.confirmed_deposits <= 2,
            "Invariant violated: confirmed deposits {} > 2",
            self.confirmed_deposits
        );
        debug_assert_eq!(
            self.status.is_terminal(),
            self.result.is_some(),
            "Invariant violated: status {} with result {:?}",
            self.status,
            self.result
        );
        for side in Side::ALL {
            let state = self.side(side);
            debug_assert!(
                state.extra_refunded >= Decimal::ZERO,
                "Invariant violated: {side} extra refunded went negative: {}",
                state.extra_refunded
            );
            debug_assert!(
                state.extra_refunded <= (state.deposit_observed - self.stake).max(Decimal::ZERO),
                "Invariant violated: {side} refunded {} beyond its overpayment on {}",
                state.extra_refunded,
                state.deposit_observed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record() -> MatchRecord {
        MatchRecord::new(
            MatchId::new(),
            dec!(10),
            [Address::new("w-pay"), Address::new("b-pay")],
            [Address::new("w-esc"), Address::new("b-esc")],
        )
    }

    #[test]
    fn new_record_waits_for_deposits() {
        let record = record();
        assert_eq!(record.status, MatchStatus::WaitingForDeposits);
        assert_eq!(record.result, None);
        assert_eq!(record.confirmed_deposits, 0);
        assert_eq!(record.white.deposit_observed, Decimal::ZERO);
        assert_eq!(record.black.escrow_address, Address::new("b-esc"));
        assert!(record.tx_ids.is_empty());
    }

    #[test]
    fn terminalize_sets_result() {
        let mut record = record();
        record.terminalize(MatchStatus::Aborted, MatchResult::Aborted);
        assert!(record.status.is_terminal());
        assert_eq!(record.result, Some(MatchResult::Aborted));
        record.assert_invariants();
    }

    #[test]
    fn observe_keeps_refunded_overpayment_covered() {
        let mut record = record();
        assert_eq!(record.observe(Side::White, dec!(7)), dec!(7));
        assert_eq!(record.observe(Side::White, dec!(3)), dec!(3));

        record.observe(Side::Black, dec!(15));
        record.black.extra_refunded = dec!(5);
        assert_eq!(record.observe(Side::Black, dec!(12)), dec!(15));
        assert_eq!(record.observe(Side::Black, dec!(16)), dec!(16));
        record.assert_invariants();
    }

    #[test]
    fn parse_reported_result() {
        assert_eq!("white".parse(), Ok(ReportedResult::White));
        assert_eq!(" Black ".parse(), Ok(ReportedResult::Black));
        assert_eq!("DRAW".parse(), Ok(ReportedResult::Draw));
        assert_eq!(
            "aborted".parse::<ReportedResult>(),
            Err(ValidationError::InvalidResult("aborted".into()))
        );
    }

    #[test]
    fn status_strings() {
        assert_eq!(MatchStatus::WaitingForDeposits.to_string(), "waiting_for_deposits");
        assert_eq!(
            serde_json::to_string(&MatchStatus::ReadyToPlay).unwrap(),
            "\"ready_to_play\""
        );
        assert!(!MatchStatus::ReadyToPlay.is_terminal());
        assert!(MatchStatus::Aborted.is_terminal());
    }
}
