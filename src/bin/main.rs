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

use clap::Parser;
use csv::{ReaderBuilder, Trim};
use match_escrow_rs::{
    Address, EscrowConfig, EscrowEngine, EscrowError, LedgerGateway, MatchId, Side,
    SimulatedLedger,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Match Escrow - Replay escrow scenarios against a simulated ledger node
///
/// Reads scenario steps from a CSV file and prints the final state of every
/// match to stdout as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "match-escrow-rs")]
#[command(about = "Replays chess match escrow scenarios", long_about = None)]
struct Args {
    /// Path to CSV file with scenario steps
    ///
    /// Expected format: op,match,side,amount,white,black,result
    /// Example: cargo run -- scenario.csv > matches.jsonl
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Label prefix for escrow addresses allocated on the node
    #[arg(long, env = "ESCROW_LABEL_PREFIX", default_value = "pepchess")]
    label_prefix: String,

    /// Currency ticker shown in under-deposit advisories
    #[arg(long, env = "ESCROW_TICKER", default_value = "PEP")]
    ticker: String,

    /// Confirmations a deposit needs before it counts
    #[arg(long, env = "ESCROW_MIN_CONFIRMATIONS", default_value_t = 1)]
    min_confirmations: u32,

    /// Upper bound for each ledger node call, in milliseconds
    #[arg(long, env = "ESCROW_GATEWAY_TIMEOUT_MS", default_value_t = 10_000)]
    timeout_ms: u64,
}

impl Args {
    fn config(&self) -> EscrowConfig {
        EscrowConfig {
            address_label_prefix: self.label_prefix.clone(),
            currency_ticker: self.ticker.clone(),
            min_confirmations: self.min_confirmations,
            gateway_timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let ledger = Arc::new(SimulatedLedger::new());
    let engine = EscrowEngine::with_timeout(Arc::clone(&ledger), args.config());

    if let Err(e) = replay(BufReader::new(file), &engine, &ledger) {
        eprintln!("Error replaying scenario: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_matches(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the scenario format.
///
/// Fields: `op, match, side, amount, white, black, result`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(rename = "match")]
    label: String,
    side: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    white: Option<String>,
    black: Option<String>,
    result: Option<String>,
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Create {
        label: String,
        stake: Decimal,
        white: Address,
        black: Address,
    },
    Deposit {
        label: String,
        side: Side,
        amount: Decimal,
    },
    Poll(String),
    Abort(String),
    Result { label: String, result: String },
    Offline,
    Online,
}

impl CsvRecord {
    /// Converts a CSV record to a scenario step.
    ///
    /// Returns `None` for unknown ops or missing required fields.
    fn into_step(self) -> Option<Step> {
        let label = self.label;
        match self.op.to_lowercase().as_str() {
            "create" => Some(Step::Create {
                label,
                stake: self.amount?,
                white: Address::new(self.white.unwrap_or_default()),
                black: Address::new(self.black.unwrap_or_default()),
            }),
            "deposit" => {
                let side = match self.side?.to_lowercase().as_str() {
                    "white" => Side::White,
                    "black" => Side::Black,
                    _ => return None,
                };
                Some(Step::Deposit {
                    label,
                    side,
                    amount: self.amount?,
                })
            }
            "poll" => Some(Step::Poll(label)),
            "abort" => Some(Step::Abort(label)),
            "result" => Some(Step::Result {
                label,
                result: self.result.unwrap_or_default(),
            }),
            "offline" => Some(Step::Offline),
            "online" => Some(Step::Online),
            _ => None,
        }
    }
}

/// Replays scenario steps from a CSV reader.
///
/// Match labels in the file name the matches created by earlier `create`
/// steps. Malformed rows and failed operations are logged and skipped.
///
/// # Example
///
/// ```csv
/// op,match,side,amount,white,black,result
/// create,m1,,10,alice,bob,
/// deposit,m1,white,10,,,
/// deposit,m1,black,12,,,
/// poll,m1,,,,,
/// result,m1,,,,,white
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn replay<R, G>(
    reader: R,
    engine: &EscrowEngine<G>,
    ledger: &SimulatedLedger,
) -> Result<HashMap<String, MatchId>, csv::Error>
where
    R: Read,
    G: LedgerGateway,
{
    let mut labels: HashMap<String, MatchId> = HashMap::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let step = match result {
            Ok(record) => match record.into_step() {
                Some(step) => step,
                None => {
                    tracing::warn!(row, "skipping invalid scenario step");
                    continue;
                }
            },
            Err(e) => {
                tracing::warn!(row, error = %e, "skipping malformed row");
                continue;
            }
        };

        if let Err(e) = apply(step, engine, ledger, &mut labels) {
            tracing::warn!(row, error = %e, "scenario step failed");
        }
    }

    Ok(labels)
}

/// Why a scenario step could not be applied.
#[derive(Debug, Error)]
enum StepError {
    #[error("unknown match label '{0}'")]
    UnknownLabel(String),

    #[error(transparent)]
    Escrow(#[from] EscrowError),
}

fn lookup(labels: &HashMap<String, MatchId>, label: &str) -> Result<MatchId, StepError> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| StepError::UnknownLabel(label.to_string()))
}

fn apply<G: LedgerGateway>(
    step: Step,
    engine: &EscrowEngine<G>,
    ledger: &SimulatedLedger,
    labels: &mut HashMap<String, MatchId>,
) -> Result<(), StepError> {
    match step {
        Step::Create {
            label,
            stake,
            white,
            black,
        } => {
            let view = engine.create_match(stake, white, black)?;
            labels.insert(label, view.match_id);
        }
        Step::Deposit {
            label,
            side,
            amount,
        } => {
            let view = engine.get_match(&lookup(labels, &label)?)?;
            let escrow = match side {
                Side::White => view.white_escrow,
                Side::Black => view.black_escrow,
            };
            ledger.credit(&escrow, amount);
        }
        Step::Poll(label) => {
            let view = engine.poll_match(&lookup(labels, &label)?)?;
            if !view.under_deposit_message.is_empty() {
                tracing::info!(match_label = %label, "{}", view.under_deposit_message);
            }
        }
        Step::Abort(label) => {
            engine.abort_match(&lookup(labels, &label)?)?;
        }
        Step::Result { label, result } => {
            engine.report_result(&lookup(labels, &label)?, &result)?;
        }
        Step::Offline => ledger.set_online(false),
        Step::Online => ledger.set_online(true),
    }
    Ok(())
}

/// Writes every match view as one JSON object per line.
fn write_matches<G: LedgerGateway, W: Write>(
    engine: &EscrowEngine<G>,
    mut writer: W,
) -> std::io::Result<()> {
    for view in engine.matches() {
        serde_json::to_writer(&mut writer, &view)?;
        writeln!(writer)?;
    }
    writer.flush()
}
