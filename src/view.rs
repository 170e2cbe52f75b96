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

//! Caller-facing views of matches and settlements.
//!
//! Field names follow the JSON shape the API layer exposes (camelCase), and
//! amounts serialize as decimal strings.

use crate::base::{Address, MatchId, TxId};
use crate::config::EscrowConfig;
use crate::reconcile::advisories;
use crate::record::{MatchRecord, MatchResult, MatchStatus};
use crate::settlement::Settlement;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub match_id: MatchId,
    pub stake: Decimal,
    pub status: MatchStatus,
    pub white_address: Address,
    pub black_address: Address,
    pub white_escrow: Address,
    pub black_escrow: Address,
    pub white_deposit: Decimal,
    pub black_deposit: Decimal,
    pub white_extra_refunded: bool,
    pub white_extra_amount: Decimal,
    pub black_extra_refunded: bool,
    pub black_extra_amount: Decimal,
    pub confirmed_deposits: u8,
    pub tx_ids: Vec<TxId>,
    pub result: Option<MatchResult>,
    /// Under-deposit advisories joined by spaces; empty when there are none.
    pub under_deposit_message: String,
}

impl MatchView {
    /// Builds the view; advisories are only shown while deposits are open.
    pub fn new(record: &MatchRecord, config: &EscrowConfig) -> Self {
        let under_deposit_message = if record.status.is_terminal() {
            String::new()
        } else {
            advisories(record, &config.currency_ticker).join(" ")
        };
        Self {
            match_id: record.id,
            stake: record.stake,
            status: record.status,
            white_address: record.white.payout_address.clone(),
            black_address: record.black.payout_address.clone(),
            white_escrow: record.white.escrow_address.clone(),
            black_escrow: record.black.escrow_address.clone(),
            white_deposit: record.white.deposit_observed,
            black_deposit: record.black.deposit_observed,
            white_extra_refunded: record.white.extra_refunded > Decimal::ZERO,
            white_extra_amount: record.white.extra_refunded,
            black_extra_refunded: record.black.extra_refunded > Decimal::ZERO,
            black_extra_amount: record.black.extra_refunded,
            confirmed_deposits: record.confirmed_deposits,
            tx_ids: record.tx_ids.clone(),
            result: record.result,
            under_deposit_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortResult {
    pub status: MatchStatus,
    pub tx_ids: Vec<TxId>,
    pub white_deposit: Decimal,
    pub black_deposit: Decimal,
}

impl From<Settlement> for AbortResult {
    fn from(settlement: Settlement) -> Self {
        Self {
            status: settlement.status,
            tx_ids: settlement.tx_ids,
            white_deposit: settlement.observation.white,
            black_deposit: settlement.observation.black,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResult {
    pub status: MatchStatus,
    pub result: MatchResult,
    pub tx_ids: Vec<TxId>,
    pub white_deposit: Decimal,
    pub black_deposit: Decimal,
}

impl From<Settlement> for SettleResult {
    fn from(settlement: Settlement) -> Self {
        Self {
            status: settlement.status,
            result: settlement.result,
            tx_ids: settlement.tx_ids,
            white_deposit: settlement.observation.white,
            black_deposit: settlement.observation.black,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_camel_case_with_string_amounts() {
        let mut record = MatchRecord::new(
            MatchId::new(),
            dec!(10),
            [Address::new("w-pay"), Address::new("b-pay")],
            [Address::new("w-esc"), Address::new("b-esc")],
        );
        record.black.deposit_observed = dec!(12);
        record.black.extra_refunded = dec!(2);

        let view = MatchView::new(&record, &EscrowConfig::default());
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["status"], "waiting_for_deposits");
        assert_eq!(json["stake"], "10");
        assert_eq!(json["blackDeposit"], "12");
        assert_eq!(json["blackExtraRefunded"], true);
        assert_eq!(json["blackExtraAmount"], "2");
        assert_eq!(json["whiteExtraRefunded"], false);
        assert_eq!(json["whiteEscrow"], "w-esc");
        assert_eq!(json["result"], serde_json::Value::Null);
        assert_eq!(json["underDepositMessage"], "");
    }

    #[test]
    fn terminal_match_has_no_advisory() {
        let mut record = MatchRecord::new(
            MatchId::new(),
            dec!(10),
            [Address::new("w-pay"), Address::new("b-pay")],
            [Address::new("w-esc"), Address::new("b-esc")],
        );
        record.white.deposit_observed = dec!(4);
        assert!(!MatchView::new(&record, &EscrowConfig::default())
            .under_deposit_message
            .is_empty());

        record.terminalize(MatchStatus::Aborted, MatchResult::Aborted);
        assert!(MatchView::new(&record, &EscrowConfig::default())
            .under_deposit_message
            .is_empty());
    }
}
