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

//! Deposit reconciliation.
//!
//! Every poll of a live match reads both escrow totals from the ledger node and
//! folds them into the [`MatchRecord`]:
//!
//! - **Under-deposits** produce an advisory naming the exact shortfall.
//! - **Overpayments** are refunded incrementally: only the part of
//!   `max(0, observed - stake)` not yet refunded is sent, so repeated polls of
//!   the same totals never pay twice and a regressed (stale) read pays nothing.
//! - **Confirmations** count the sides whose effective deposit
//!   (`min(observed, stake)`) reaches the stake; both confirmed means
//!   `ready_to_play`, otherwise `waiting_for_deposits`.
//!
//! Totals and status are stored before any refund is sent. A gateway failure
//! stops the refund pass where it happened, and refunds that already went out
//! keep their bookkeeping. Once an overpayment is refunded, a lower read never
//! pulls the stored total under `stake + extra_refunded`.

use crate::base::{Side, TxId};
use crate::error::GatewayError;
use crate::gateway::LedgerGateway;
use crate::record::{MatchRecord, MatchStatus};
use rust_decimal::Decimal;

/// Advisory amounts are shown with this many decimal places.
const ADVISORY_PRECISION: u32 = 4;

/// Cumulative escrow totals read from the node at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub white: Decimal,
    pub black: Decimal,
}

impl Observation {
    pub fn new(white: Decimal, black: Decimal) -> Self {
        Self { white, black }
    }

    pub fn get(&self, side: Side) -> Decimal {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    /// Reads both escrow totals, white first.
    pub fn fetch<G: LedgerGateway + ?Sized>(
        gateway: &G,
        record: &MatchRecord,
        min_confirmations: u32,
    ) -> Result<Self, GatewayError> {
        let white = gateway.received_by_address(&record.white.escrow_address, min_confirmations)?;
        let black = gateway.received_by_address(&record.black.escrow_address, min_confirmations)?;
        Ok(Self { white, black })
    }
}

/// An overpayment refund issued during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub side: Side,
    pub amount: Decimal,
    pub tx_id: TxId,
}

/// Amount still missing before `observed` covers `stake`.
///
/// `None` when nothing was deposited yet or the stake is already covered.
pub fn shortfall(stake: Decimal, observed: Decimal) -> Option<Decimal> {
    (observed > Decimal::ZERO && observed < stake).then(|| stake - observed)
}

/// Portion of a deposit that counts towards the pot.
pub fn effective(stake: Decimal, observed: Decimal) -> Decimal {
    observed.min(stake)
}

/// Overpayment refund still owed, never negative.
pub fn refund_delta(stake: Decimal, observed: Decimal, already_refunded: Decimal) -> Decimal {
    let extra_due = (observed - stake).max(Decimal::ZERO);
    (extra_due - already_refunded).max(Decimal::ZERO)
}

pub fn confirmed_count(stake: Decimal, observation: &Observation) -> u8 {
    Side::ALL
        .iter()
        .filter(|&&side| effective(stake, observation.get(side)) >= stake)
        .count() as u8
}

pub fn status_for(confirmed: u8) -> MatchStatus {
    if confirmed == 2 {
        MatchStatus::ReadyToPlay
    } else {
        MatchStatus::WaitingForDeposits
    }
}

/// Under-deposit messages for the record's last-known totals.
pub fn advisories(record: &MatchRecord, ticker: &str) -> Vec<String> {
    Side::ALL
        .iter()
        .filter_map(|&side| {
            let observed = record.side(side).deposit_observed;
            shortfall(record.stake, observed).map(|missing| {
                let name = match side {
                    Side::White => "White",
                    Side::Black => "Black",
                };
                format!(
                    "{name} has deposited too little ({observed:.prec$} {ticker}) — please send an additional {missing:.prec$} {ticker} to start the match.",
                    observed = observed.round_dp(ADVISORY_PRECISION),
                    missing = missing.round_dp(ADVISORY_PRECISION),
                    prec = ADVISORY_PRECISION as usize,
                )
            })
        })
        .collect()
}

/// Reads fresh totals from the node and reconciles the record against them.
pub fn reconcile<G: LedgerGateway + ?Sized>(
    record: &mut MatchRecord,
    gateway: &G,
    min_confirmations: u32,
) -> Result<Vec<Refund>, GatewayError> {
    let observation = Observation::fetch(gateway, record, min_confirmations)?;
    apply_observation(record, observation, gateway)
}

/// Folds one observation into the record, refunding overpayments.
///
/// Must only be called on a non-terminal record.
pub fn apply_observation<G: LedgerGateway + ?Sized>(
    record: &mut MatchRecord,
    observation: Observation,
    gateway: &G,
) -> Result<Vec<Refund>, GatewayError> {
    debug_assert!(
        !record.status.is_terminal(),
        "reconciling terminal match {}",
        record.id
    );
    let stake = record.stake;

    for side in Side::ALL {
        let fresh = observation.get(side);
        let previous = record.side(side).deposit_observed;
        let stored = record.observe(side, fresh);
        if fresh < previous {
            tracing::warn!(
                match_id = %record.id,
                %side,
                %previous,
                observed = %fresh,
                %stored,
                "escrow total went down; treating read as stale"
            );
        }
    }

    let stored = Observation::new(record.white.deposit_observed, record.black.deposit_observed);
    let confirmed = confirmed_count(stake, &stored);
    record.confirmed_deposits = confirmed;
    record.status = status_for(confirmed);

    let mut refunds = Vec::new();
    for side in Side::ALL {
        let state = record.side(side);
        let delta = refund_delta(stake, state.deposit_observed, state.extra_refunded);
        if delta.is_zero() {
            continue;
        }
        let payout = state.payout_address.clone();
        let tx_id = gateway.send_to(&payout, delta)?;
        tracing::debug!(match_id = %record.id, %side, amount = %delta, tx = %tx_id, "refunded overpayment");

        record.side_mut(side).extra_refunded += delta;
        record.assert_invariants();
        record.tx_ids.push(tx_id.clone());
        refunds.push(Refund {
            side,
            amount: delta,
            tx_id,
        });
    }

    record.assert_invariants();
    Ok(refunds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Address, MatchId};
    use crate::simulated::SimulatedLedger;
    use rust_decimal_macros::dec;

    fn record(stake: Decimal) -> MatchRecord {
        MatchRecord::new(
            MatchId::new(),
            stake,
            [Address::new("w-pay"), Address::new("b-pay")],
            [Address::new("w-esc"), Address::new("b-esc")],
        )
    }

    #[test]
    fn shortfall_only_for_partial_deposits() {
        assert_eq!(shortfall(dec!(5), Decimal::ZERO), None);
        assert_eq!(shortfall(dec!(5), dec!(3)), Some(dec!(2)));
        assert_eq!(shortfall(dec!(5), dec!(5)), None);
        assert_eq!(shortfall(dec!(5), dec!(7)), None);
    }

    #[test]
    fn refund_delta_clamps_at_zero() {
        assert_eq!(refund_delta(dec!(10), dec!(12), Decimal::ZERO), dec!(2));
        assert_eq!(refund_delta(dec!(10), dec!(15), dec!(2)), dec!(3));
        assert_eq!(refund_delta(dec!(10), dec!(11), dec!(5)), Decimal::ZERO);
        assert_eq!(refund_delta(dec!(10), dec!(4), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn confirmation_requires_full_stake() {
        let stake = dec!(10);
        assert_eq!(confirmed_count(stake, &Observation::new(dec!(10), dec!(9.99))), 1);
        assert_eq!(confirmed_count(stake, &Observation::new(dec!(12), dec!(10))), 2);
        assert_eq!(status_for(2), MatchStatus::ReadyToPlay);
        assert_eq!(status_for(1), MatchStatus::WaitingForDeposits);
    }

    #[test]
    fn advisory_names_the_shortfall() {
        let mut record = record(dec!(5));
        record.black.deposit_observed = dec!(3);
        let messages = advisories(&record, "PEP");
        assert_eq!(
            messages,
            vec![
                "Black has deposited too little (3.0000 PEP) — please send an additional 2.0000 PEP to start the match."
                    .to_string()
            ]
        );
    }

    #[test]
    fn overpayment_is_refunded_once() {
        let ledger = SimulatedLedger::new();
        let mut record = record(dec!(10));

        let refunds =
            apply_observation(&mut record, Observation::new(dec!(10), dec!(12)), &ledger).unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].side, Side::Black);
        assert_eq!(refunds[0].amount, dec!(2));
        assert_eq!(record.black.extra_refunded, dec!(2));
        assert_eq!(record.status, MatchStatus::ReadyToPlay);

        let again =
            apply_observation(&mut record, Observation::new(dec!(10), dec!(12)), &ledger).unwrap();
        assert!(again.is_empty());
        assert_eq!(ledger.sent().len(), 1);
        assert_eq!(record.tx_ids.len(), 1);
    }

    #[test]
    fn send_failure_keeps_earlier_refund() {
        let ledger = SimulatedLedger::new();
        ledger.fail_sends_after(1);
        let mut record = record(dec!(10));

        let result = apply_observation(&mut record, Observation::new(dec!(11), dec!(13)), &ledger);
        assert!(result.is_err());
        assert_eq!(record.white.extra_refunded, dec!(1));
        assert_eq!(record.black.extra_refunded, Decimal::ZERO);
        // Deposits meet the stake even though a refund is still owed.
        assert_eq!(record.black.deposit_observed, dec!(13));
        assert_eq!(record.confirmed_deposits, 2);
        assert_eq!(record.status, MatchStatus::ReadyToPlay);

        ledger.clear_send_failures();
        let refunds =
            apply_observation(&mut record, Observation::new(dec!(11), dec!(13)), &ledger).unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, dec!(3));
        assert_eq!(ledger.total_sent_to(&Address::new("w-pay")), dec!(1));
    }

    #[test]
    fn lower_read_after_refund_keeps_overpayment_covered() {
        let ledger = SimulatedLedger::new();
        let mut record = record(dec!(10));

        apply_observation(&mut record, Observation::new(dec!(15), Decimal::ZERO), &ledger).unwrap();
        assert_eq!(record.white.extra_refunded, dec!(5));

        let refunds =
            apply_observation(&mut record, Observation::new(dec!(12), Decimal::ZERO), &ledger).unwrap();
        assert!(refunds.is_empty());
        assert_eq!(record.white.deposit_observed, dec!(15));
        assert_eq!(record.white.extra_refunded, dec!(5));
        assert_eq!(record.confirmed_deposits, 1);
        record.assert_invariants();

        // Growth past the earlier peak is refunded from there.
        let refunds =
            apply_observation(&mut record, Observation::new(dec!(17), Decimal::ZERO), &ledger).unwrap();
        assert_eq!(refunds[0].amount, dec!(2));
        assert_eq!(ledger.total_sent_to(&Address::new("w-pay")), dec!(7));
    }

    #[test]
    fn lower_read_without_refund_is_stored_as_read() {
        let ledger = SimulatedLedger::new();
        let mut record = record(dec!(10));
        apply_observation(&mut record, Observation::new(dec!(10), dec!(10)), &ledger).unwrap();
        assert_eq!(record.status, MatchStatus::ReadyToPlay);

        apply_observation(&mut record, Observation::new(dec!(10), dec!(9)), &ledger).unwrap();
        assert_eq!(record.black.deposit_observed, dec!(9));
        assert_eq!(record.status, MatchStatus::WaitingForDeposits);
    }
}
