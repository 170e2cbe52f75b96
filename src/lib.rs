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

//! # Match Escrow
//!
//! Escrow coordination for two-player wagered chess matches. Each match gets
//! a fresh deposit address per player. Deposits are reconciled against a
//! ledger node on every poll, overpayments are refunded incrementally, and
//! the pot is disbursed exactly once when the match is aborted or a result is
//! reported.
//!
//! ## Core Components
//!
//! - [`EscrowEngine`]: The four operations an API layer binds to
//! - [`LedgerGateway`]: What the engine needs from a ledger node
//! - [`MatchStore`]: Record storage with per-match exclusive updates
//! - [`reconcile`]: Deposit reconciliation and overpayment refunds
//! - [`settlement`]: Abort and result payouts
//! - [`EscrowError`]: Error types for escrow operations
//!
//! ## Example
//!
//! ```
//! use match_escrow_rs::{Address, EscrowConfig, EscrowEngine, MatchStatus, SimulatedLedger};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(SimulatedLedger::new());
//! let engine = EscrowEngine::new(Arc::clone(&ledger), EscrowConfig::default());
//!
//! let view = engine
//!     .create_match(dec!(10), Address::new("alice"), Address::new("bob"))
//!     .unwrap();
//!
//! // Both players deposit; black sends 2 too many.
//! ledger.credit(&view.white_escrow, dec!(10));
//! ledger.credit(&view.black_escrow, dec!(12));
//!
//! let view = engine.poll_match(&view.match_id).unwrap();
//! assert_eq!(view.status, MatchStatus::ReadyToPlay);
//! assert_eq!(view.black_extra_amount, dec!(2));
//!
//! let settled = engine.report_result(&view.match_id, "white").unwrap();
//! assert_eq!(settled.status, MatchStatus::Settled);
//! assert_eq!(ledger.total_sent_to(&Address::new("alice")), dec!(20));
//! ```
//!
//! ## Thread Safety
//!
//! Records live in a concurrent map, each behind its own lock. Operations on
//! the same match are serialized, and different matches proceed in parallel.

mod base;
mod config;
mod engine;
pub mod error;
pub mod gateway;
pub mod reconcile;
pub mod record;
pub mod settlement;
pub mod simulated;
pub mod store;
pub mod view;

pub use base::{Address, MatchId, Side, TxId};
pub use config::EscrowConfig;
pub use engine::EscrowEngine;
pub use error::{EscrowError, GatewayError, ValidationError};
pub use gateway::{LedgerGateway, MIN_CONFIRMATIONS, TimeoutGateway};
pub use reconcile::Observation;
pub use record::{MatchRecord, MatchResult, MatchStatus, ReportedResult, SideState};
pub use settlement::{Disbursement, LegPurpose, Settlement, SettlementKind, SettlementPlan};
pub use simulated::{SentPayment, SimulatedLedger};
pub use store::{InMemoryMatchStore, MatchStore};
pub use view::{AbortResult, MatchView, SettleResult};
