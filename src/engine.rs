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

//! Escrow engine.
//!
//! The [`EscrowEngine`] is the surface an API layer binds to. It creates
//! matches, reconciles them on every poll, and settles them exactly once.
//!
//! # Operations
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | `create_match` | Validates input, allocates two escrow addresses, stores the match |
//! | `poll_match` | Reconciles a live match against the node, never fails on node errors |
//! | `abort_match` | Refunds each side up to the stake, terminal `aborted` |
//! | `report_result` | Pays the pot to the winner or splits it on a draw, terminal `settled` |
//!
//! # Thread Safety
//!
//! All operations on one match run under that match's lock (see
//! [`MatchStore::update`]), so two settlements, or a settlement and a poll,
//! never interleave. The terminal-state check and the terminal transition
//! happen inside the same critical section.

use crate::base::{Address, MatchId, Side};
use crate::config::EscrowConfig;
use crate::error::{EscrowError, GatewayError, ValidationError};
use crate::gateway::{LedgerGateway, TimeoutGateway};
use crate::reconcile::reconcile;
use crate::record::{MatchRecord, ReportedResult};
use crate::settlement::{SettlementKind, settle};
use crate::store::{InMemoryMatchStore, MatchStore};
use crate::view::{AbortResult, MatchView, SettleResult};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct EscrowEngine<G, S = InMemoryMatchStore> {
    gateway: G,
    store: S,
    config: EscrowConfig,
}

impl<G: LedgerGateway> EscrowEngine<G, InMemoryMatchStore> {
    /// Creates an engine with an empty in-memory store.
    ///
    /// `gateway` is used as given; see [`EscrowEngine::with_timeout`] for a
    /// gateway bounded by `config.gateway_timeout`.
    pub fn new(gateway: G, config: EscrowConfig) -> Self {
        Self::with_store(gateway, InMemoryMatchStore::new(), config)
    }
}

impl<N: LedgerGateway + 'static> EscrowEngine<TimeoutGateway<N>, InMemoryMatchStore> {
    /// Creates an engine whose every node call is bounded by
    /// `config.gateway_timeout`.
    pub fn with_timeout(node: Arc<N>, config: EscrowConfig) -> Self {
        let gateway = TimeoutGateway::new(node, config.gateway_timeout);
        Self::new(gateway, config)
    }
}

impl<G: LedgerGateway, S: MatchStore> EscrowEngine<G, S> {
    pub fn with_store(gateway: G, store: S, config: EscrowConfig) -> Self {
        Self {
            gateway,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// Creates a match with a fresh escrow address per side.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::NonPositiveStake`] - Stake is zero or negative.
    /// - [`ValidationError::MissingAddress`] - A payout address is blank.
    /// - [`EscrowError::Gateway`] - Address allocation failed, or the node
    ///   handed out an address already in use by this match. Nothing is stored.
    pub fn create_match(
        &self,
        stake: Decimal,
        white_address: Address,
        black_address: Address,
    ) -> Result<MatchView, EscrowError> {
        if stake <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveStake.into());
        }
        if white_address.is_blank() {
            return Err(ValidationError::MissingAddress(Side::White).into());
        }
        if black_address.is_blank() {
            return Err(ValidationError::MissingAddress(Side::Black).into());
        }

        let white_escrow = self
            .gateway
            .new_address(&self.config.address_label(Side::White))?;
        let black_escrow = self
            .gateway
            .new_address(&self.config.address_label(Side::Black))?;

        if white_escrow == black_escrow
            || [&white_escrow, &black_escrow]
                .iter()
                .any(|escrow| **escrow == white_address || **escrow == black_address)
        {
            return Err(GatewayError::Rejected(
                "node returned an escrow address that is already in use".into(),
            )
            .into());
        }

        let record = MatchRecord::new(
            MatchId::new(),
            stake,
            [white_address, black_address],
            [white_escrow, black_escrow],
        );
        let view = MatchView::new(&record, &self.config);
        self.store.insert(record)?;

        tracing::info!(
            match_id = %view.match_id,
            %stake,
            white_escrow = %view.white_escrow,
            black_escrow = %view.black_escrow,
            "match created"
        );
        Ok(view)
    }

    /// Returns the stored view without contacting the node.
    pub fn get_match(&self, id: &MatchId) -> Result<MatchView, EscrowError> {
        self.store
            .get(id)
            .map(|record| MatchView::new(&record, &self.config))
            .ok_or(EscrowError::NotFound(*id))
    }

    /// Views of every match, in no particular order.
    pub fn matches(&self) -> Vec<MatchView> {
        self.store
            .ids()
            .iter()
            .filter_map(|id| self.get_match(id).ok())
            .collect()
    }

    /// Reconciles a live match against the node and returns its view.
    ///
    /// Node failures are logged and swallowed; the last-known state is
    /// returned instead. Terminal matches, and matches with a partially
    /// disbursed settlement, are returned as stored.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotFound`] if the match does not exist.
    pub fn poll_match(&self, id: &MatchId) -> Result<MatchView, EscrowError> {
        self.store
            .update(id, |record| {
                if !record.status.is_terminal() && record.pending_settlement.is_none() {
                    match reconcile(record, &self.gateway, self.config.min_confirmations) {
                        Ok(refunds) => {
                            for refund in &refunds {
                                tracing::info!(
                                    match_id = %id,
                                    side = %refund.side,
                                    amount = %refund.amount,
                                    tx = %refund.tx_id,
                                    "overpayment refunded"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::warn!(match_id = %id, error = %e, "poll failed; keeping last known state");
                        }
                    }
                }
                MatchView::new(record, &self.config)
            })
            .ok_or(EscrowError::NotFound(*id))
    }

    /// Aborts a match, refunding each side up to the stake.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::NotFound`] - Unknown match.
    /// - [`EscrowError::InvalidState`] - Match is already settled or aborted.
    /// - [`EscrowError::SettlementInProgress`] - A result payout is half done.
    /// - [`EscrowError::NothingToRefund`] - Neither side deposited anything.
    /// - [`EscrowError::Gateway`] - Node unreachable.
    pub fn abort_match(&self, id: &MatchId) -> Result<AbortResult, EscrowError> {
        self.store
            .update(id, |record| {
                settle(
                    record,
                    SettlementKind::Abort,
                    &self.gateway,
                    self.config.min_confirmations,
                )
            })
            .ok_or(EscrowError::NotFound(*id))?
            .map(AbortResult::from)
    }

    /// Settles a match with a result given as text (`white`, `black` or `draw`).
    ///
    /// # Errors
    ///
    /// - [`EscrowError::NotFound`] - Unknown match.
    /// - [`EscrowError::InvalidState`] - Match is already settled or aborted.
    /// - [`ValidationError::InvalidResult`] - Result text is not recognised.
    /// - [`EscrowError::SettlementInProgress`] - An abort is half done.
    /// - [`EscrowError::Gateway`] - Node unreachable.
    pub fn report_result(&self, id: &MatchId, result: &str) -> Result<SettleResult, EscrowError> {
        self.store
            .update(id, |record| {
                if record.status.is_terminal() {
                    return Err(EscrowError::InvalidState(record.status));
                }
                let result: ReportedResult = result.parse()?;
                settle(
                    record,
                    SettlementKind::Result(result),
                    &self.gateway,
                    self.config.min_confirmations,
                )
            })
            .ok_or(EscrowError::NotFound(*id))?
            .map(SettleResult::from)
    }

    /// Typed variant of [`EscrowEngine::report_result`].
    pub fn settle_result(
        &self,
        id: &MatchId,
        result: ReportedResult,
    ) -> Result<SettleResult, EscrowError> {
        self.store
            .update(id, |record| {
                settle(
                    record,
                    SettlementKind::Result(result),
                    &self.gateway,
                    self.config.min_confirmations,
                )
            })
            .ok_or(EscrowError::NotFound(*id))?
            .map(SettleResult::from)
    }
}
