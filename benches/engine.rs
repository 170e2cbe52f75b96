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

//! Benchmarks for the escrow engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Match creation
//! - Polling (idle and with an overpayment refund)
//! - Settlement
//! - Parallel polling across many matches

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use match_escrow_rs::{Address, EscrowConfig, EscrowEngine, MatchId, SimulatedLedger};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

type Engine = EscrowEngine<Arc<SimulatedLedger>>;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (Arc<SimulatedLedger>, Engine) {
    let ledger = Arc::new(SimulatedLedger::new());
    let engine = EscrowEngine::new(Arc::clone(&ledger), EscrowConfig::default());
    (ledger, engine)
}

fn funded_match(ledger: &SimulatedLedger, engine: &Engine, white: i64, black: i64) -> MatchId {
    let view = engine
        .create_match(
            Decimal::new(10, 0),
            Address::new("white-payout"),
            Address::new("black-payout"),
        )
        .unwrap();
    ledger.credit(&view.white_escrow, Decimal::new(white, 0));
    ledger.credit(&view.black_escrow, Decimal::new(black, 0));
    view.match_id
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_create_match(c: &mut Criterion) {
    let (_ledger, engine) = setup();
    c.bench_function("create_match", |b| {
        b.iter(|| {
            engine
                .create_match(
                    black_box(Decimal::new(10, 0)),
                    Address::new("white-payout"),
                    Address::new("black-payout"),
                )
                .unwrap();
        })
    });
}

fn bench_idle_poll(c: &mut Criterion) {
    let (ledger, engine) = setup();
    let id = funded_match(&ledger, &engine, 10, 10);
    c.bench_function("idle_poll", |b| {
        b.iter(|| {
            black_box(engine.poll_match(black_box(&id)).unwrap());
        })
    });
}

fn bench_poll_with_refund(c: &mut Criterion) {
    c.bench_function("poll_with_refund", |b| {
        b.iter_batched(
            || {
                let (ledger, engine) = setup();
                let id = funded_match(&ledger, &engine, 12, 15);
                (ledger, engine, id)
            },
            |(_ledger, engine, id)| {
                black_box(engine.poll_match(&id).unwrap());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_settlement(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement");

    for outcome in ["white", "draw", "abort"] {
        group.bench_function(outcome, |b| {
            b.iter_batched(
                || {
                    let (ledger, engine) = setup();
                    let id = funded_match(&ledger, &engine, 10, 10);
                    (ledger, engine, id)
                },
                |(_ledger, engine, id)| {
                    if outcome == "abort" {
                        black_box(engine.abort_match(&id).unwrap());
                    } else {
                        black_box(engine.report_result(&id, outcome).unwrap());
                    }
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_polls(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_polls");

    for num_matches in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*num_matches as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_matches),
            num_matches,
            |b, &num_matches| {
                let (ledger, engine) = setup();
                let ids: Vec<MatchId> = (0..num_matches)
                    .map(|_| funded_match(&ledger, &engine, 10, 10))
                    .collect();
                b.iter(|| {
                    ids.par_iter().for_each(|id| {
                        black_box(engine.poll_match(id).unwrap());
                    });
                })
            },
        );
    }
    group.finish();
}

fn bench_contended_polls(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_polls");

    for num_polls in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*num_polls as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_polls),
            num_polls,
            |b, &num_polls| {
                let (ledger, engine) = setup();
                let id = funded_match(&ledger, &engine, 10, 10);
                b.iter(|| {
                    (0..num_polls).into_par_iter().for_each(|_| {
                        black_box(engine.poll_match(&id).unwrap());
                    });
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    single_threaded,
    bench_create_match,
    bench_idle_poll,
    bench_poll_with_refund,
    bench_settlement,
);

criterion_group!(multi_threaded, bench_parallel_polls, bench_contended_polls,);

criterion_main!(single_threaded, multi_threaded);
