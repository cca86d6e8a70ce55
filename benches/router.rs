// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for query classification and fallback extraction.
//!
//! Run with: `cargo bench --bench router`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

use codi_runtime::config::RuntimeConfig;
use codi_runtime::orchestrator::KeywordPlanner;
use codi_runtime::router::fallback::{extract_symbols, Language};
use codi_runtime::router::{classify, IntentRouter, QueryTargets};
use codi_runtime::supervisor::RuntimeSupervisor;
use codi_runtime::tools::WalkSearcher;

const QUERIES: &[&str] = &[
    "list all functions and classes in app.py",
    "where is `parse_config` defined?",
    "find references to RuntimeSupervisor",
    "show diagnostics for src/main.rs",
    "explain how handle_request works in server.ts",
    "search for TODO",
];

fn python_source(functions: usize) -> String {
    (0..functions)
        .map(|i| {
            format!(
                "class Widget{i}:\n    def render_{i}(self):\n        return {i}\n\ndef helper_{i}(x):\n    return x + {i}\n\n"
            )
        })
        .collect()
}

/// Benchmark intent classification and target extraction.
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(QUERIES.len() as u64));

    group.bench_function("intent", |b| {
        b.iter(|| {
            for query in QUERIES {
                black_box(classify(black_box(query)));
            }
        });
    });

    group.bench_function("targets", |b| {
        b.iter(|| {
            for query in QUERIES {
                black_box(QueryTargets::extract(black_box(query)));
            }
        });
    });

    group.bench_function("plan_prompt", |b| {
        b.iter(|| {
            black_box(KeywordPlanner::synthesize(black_box(
                "create src/a.py and src/b.py with content \"x = 1\"",
            )))
        });
    });

    group.finish();
}

/// Benchmark regex symbol extraction at different file sizes.
fn bench_extract_symbols(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_symbols");

    for size in [10, 100, 1000] {
        let source = python_source(size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("python", size), &source, |b, source| {
            b.iter(|| extract_symbols(black_box(source), Language::Python));
        });
    }

    group.finish();
}

/// Benchmark a full fallback query against a small workspace.
fn bench_handle_fallback(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.py"), python_source(50)).unwrap();
    for i in 0..20 {
        fs::write(
            temp.path().join(format!("mod_{i}.py")),
            format!("from app import helper_{i}\n\nprint(helper_{i}(1))\n"),
        )
        .unwrap();
    }

    let rt = tokio::runtime::Runtime::new().unwrap();
    let router = rt.block_on(async {
        let supervisor = RuntimeSupervisor::builder(RuntimeConfig::for_workspace(temp.path()))
            .build()
            .unwrap();
        supervisor.start().await.unwrap();
        IntentRouter::new(Arc::new(supervisor), Arc::new(WalkSearcher))
    });

    let mut group = c.benchmark_group("handle");

    group.bench_function("list_symbols", |b| {
        b.iter(|| rt.block_on(router.handle(black_box("list all classes in app.py"), None)));
    });

    group.bench_function("references", |b| {
        b.iter(|| rt.block_on(router.handle(black_box("find references to helper_3"), None)));
    });

    group.finish();
}

criterion_group!(benches, bench_classify, bench_extract_symbols, bench_handle_fallback);
criterion_main!(benches);
