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

//! Match settlement.
//!
//! Settlement is the only way a match reaches a terminal state:
//!
//! - **Abort** returns each side `min(observed, stake)`.
//! - **Result** pays the whole pot (`min(white, stake) + min(black, stake)`) to
//!   the winner, or returns each side its own effective deposit on a draw.
//!
//! Overpayment is normally refunded during reconciliation. Any part of it that
//! reached the escrow after the last poll is returned to its depositor by extra
//! legs placed after the stake legs.
//!
//! Both begin from an authoritative re-read of the escrow totals, turn it into
//! a [`SettlementPlan`] of disbursement legs, and pay the legs in order.
//!
//! A plan that fails before its first leg leaves the record untouched. One that
//! fails after paying some legs is frozen on the record as its pending
//! settlement. Retrying the same kind of settlement resumes with the unpaid
//! legs only, and any other settlement is refused until it completes.

use crate::base::{Address, Side, TxId};
use crate::error::EscrowError;
use crate::gateway::LedgerGateway;
use crate::reconcile::{Observation, effective, refund_delta};
use crate::record::{MatchRecord, MatchResult, MatchStatus, ReportedResult};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementKind {
    Abort,
    Result(ReportedResult),
}

impl SettlementKind {
    fn terminal(&self) -> (MatchStatus, MatchResult) {
        match self {
            SettlementKind::Abort => (MatchStatus::Aborted, MatchResult::Aborted),
            SettlementKind::Result(result) => (MatchStatus::Settled, (*result).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegPurpose {
    /// Pot or stake return, capped at the stake.
    Stake,
    /// Deposit above the stake not yet refunded.
    Overpayment,
}

/// A single payout leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disbursement {
    pub side: Side,
    pub address: Address,
    pub amount: Decimal,
    pub purpose: LegPurpose,
}

/// Disbursements computed for one settlement, with progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub kind: SettlementKind,
    /// Totals the plan was computed from.
    pub observation: Observation,
    pub legs: Vec<Disbursement>,
    /// Transaction ids of the legs paid so far, in leg order.
    pub paid: Vec<TxId>,
}

impl SettlementPlan {
    pub fn remaining(&self) -> &[Disbursement] {
        &self.legs[self.paid.len()..]
    }
}

/// Outcome of a completed settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub status: MatchStatus,
    pub result: MatchResult,
    pub tx_ids: Vec<TxId>,
    pub observation: Observation,
}

/// Refunds each side's deposit, capped at the stake.
///
/// # Errors
///
/// [`EscrowError::NothingToRefund`] if neither side deposited anything.
pub fn plan_abort(
    record: &MatchRecord,
    observation: Observation,
) -> Result<SettlementPlan, EscrowError> {
    let mut legs = refund_legs(record, &observation);
    if legs.is_empty() {
        return Err(EscrowError::NothingToRefund);
    }
    legs.extend(overpayment_legs(record, &observation));
    Ok(SettlementPlan {
        kind: SettlementKind::Abort,
        observation,
        legs,
        paid: Vec::new(),
    })
}

/// Pays the pot to the winner, or each side's own share on a draw.
///
/// An empty pot with a winner yields a plan with no legs.
pub fn plan_result(
    record: &MatchRecord,
    result: ReportedResult,
    observation: Observation,
) -> SettlementPlan {
    let mut legs = match result.winner() {
        None => refund_legs(record, &observation),
        Some(winner) => {
            let pot: Decimal = Side::ALL
                .iter()
                .map(|&side| effective(record.stake, observation.get(side)))
                .sum();
            if pot > Decimal::ZERO {
                vec![Disbursement {
                    side: winner,
                    address: record.side(winner).payout_address.clone(),
                    amount: pot,
                    purpose: LegPurpose::Stake,
                }]
            } else {
                Vec::new()
            }
        }
    };
    legs.extend(overpayment_legs(record, &observation));
    SettlementPlan {
        kind: SettlementKind::Result(result),
        observation,
        legs,
        paid: Vec::new(),
    }
}

/// One leg per side with a non-zero effective deposit, white first.
fn refund_legs(record: &MatchRecord, observation: &Observation) -> Vec<Disbursement> {
    Side::ALL
        .iter()
        .filter_map(|&side| {
            let amount = effective(record.stake, observation.get(side));
            (amount > Decimal::ZERO).then(|| Disbursement {
                side,
                address: record.side(side).payout_address.clone(),
                amount,
                purpose: LegPurpose::Stake,
            })
        })
        .collect()
}

/// Overpayment the record has not refunded yet, white first.
fn overpayment_legs(record: &MatchRecord, observation: &Observation) -> Vec<Disbursement> {
    Side::ALL
        .iter()
        .filter_map(|&side| {
            let state = record.side(side);
            let amount = refund_delta(record.stake, observation.get(side), state.extra_refunded);
            (amount > Decimal::ZERO).then(|| Disbursement {
                side,
                address: state.payout_address.clone(),
                amount,
                purpose: LegPurpose::Overpayment,
            })
        })
        .collect()
}

/// Settles a match, paying every leg and moving it to its terminal state.
///
/// # Errors
///
/// - [`EscrowError::InvalidState`] - Match is already settled or aborted.
/// - [`EscrowError::SettlementInProgress`] - A different settlement is pending.
/// - [`EscrowError::NothingToRefund`] - Abort with nothing deposited.
/// - [`EscrowError::Gateway`] - Node unreachable while reading or paying.
pub fn settle<G: LedgerGateway + ?Sized>(
    record: &mut MatchRecord,
    kind: SettlementKind,
    gateway: &G,
    min_confirmations: u32,
) -> Result<Settlement, EscrowError> {
    if record.status.is_terminal() {
        return Err(EscrowError::InvalidState(record.status));
    }

    let mut plan = match &record.pending_settlement {
        Some(pending) if pending.kind != kind => return Err(EscrowError::SettlementInProgress),
        Some(pending) => {
            tracing::info!(
                match_id = %record.id,
                remaining = pending.remaining().len(),
                "resuming partially disbursed settlement"
            );
            pending.clone()
        }
        None => {
            let observation = Observation::fetch(gateway, record, min_confirmations)?;
            match kind {
                SettlementKind::Abort => plan_abort(record, observation)?,
                SettlementKind::Result(result) => plan_result(record, result, observation),
            }
        }
    };

    while let Some(leg) = plan.remaining().first().cloned() {
        match gateway.send_to(&leg.address, leg.amount) {
            Ok(tx_id) => {
                tracing::debug!(
                    match_id = %record.id,
                    side = %leg.side,
                    amount = %leg.amount,
                    tx = %tx_id,
                    "settlement leg paid"
                );
                if leg.purpose == LegPurpose::Overpayment {
                    record.observe(leg.side, plan.observation.get(leg.side));
                    record.side_mut(leg.side).extra_refunded += leg.amount;
                }
                record.tx_ids.push(tx_id.clone());
                plan.paid.push(tx_id);
            }
            Err(e) => {
                if !plan.paid.is_empty() {
                    tracing::warn!(
                        match_id = %record.id,
                        paid = plan.paid.len(),
                        remaining = plan.remaining().len(),
                        error = %e,
                        "settlement partially disbursed"
                    );
                    record.pending_settlement = Some(plan);
                }
                return Err(e.into());
            }
        }
    }

    if plan.legs.is_empty() {
        tracing::warn!(match_id = %record.id, "settling with an empty pot; nothing disbursed");
    }

    let (status, result) = kind.terminal();
    for side in Side::ALL {
        record.observe(side, plan.observation.get(side));
    }
    record.terminalize(status, result);
    record.assert_invariants();
    tracing::info!(match_id = %record.id, %status, ?result, txs = plan.paid.len(), "match settled");

    Ok(Settlement {
        status,
        result,
        tx_ids: plan.paid,
        observation: plan.observation,
    })
}
