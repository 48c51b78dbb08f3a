#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Benchmark claim candidate selection and lock overlap checks.
//!
//! `claim_candidates` runs on every claim against the whole board, and the
//! overlap scan runs on every proposal against every live lock.

use chrono::{TimeDelta, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nerve_core::{
    coordination::{jobs::claim_candidates, lock_path::overlaps},
    Job, JobId, JobPriority, JobStatus, ProjectId,
};

// ============================================================================
// FIXTURES
// ============================================================================

const PRIORITIES: [JobPriority; 4] = [
    JobPriority::Critical,
    JobPriority::High,
    JobPriority::Medium,
    JobPriority::Low,
];

/// A board of `size` jobs: a quarter done, the rest todo, every third todo job
/// depending on an earlier one.
fn board(size: usize) -> Vec<Job> {
    let Ok(project_id) = ProjectId::parse("bench") else {
        return Vec::new();
    };
    let start = Utc::now();
    let ids: Vec<JobId> = (0..size)
        .filter_map(|n| JobId::parse(format!("job-{n}")).ok())
        .collect();

    ids.iter()
        .enumerate()
        .map(|(n, id)| {
            let created_at = start + TimeDelta::milliseconds(i64::try_from(n).unwrap_or(i64::MAX));
            let dependencies = if n % 3 == 2 {
                ids.get(n / 2).cloned().into_iter().collect()
            } else {
                Vec::new()
            };
            Job {
                id: id.clone(),
                project_id: project_id.clone(),
                title: format!("job {n}"),
                description: String::new(),
                priority: PRIORITIES[n % PRIORITIES.len()],
                status: if n % 4 == 0 {
                    JobStatus::Done
                } else {
                    JobStatus::Todo
                },
                assigned_to: None,
                dependencies,
                created_at,
                updated_at: created_at,
                cancel_reason: None,
            }
        })
        .collect()
}

fn lock_keys(size: usize) -> Vec<String> {
    (0..size)
        .map(|n| format!("src/module_{}/file_{n}.rs", n % 16))
        .collect()
}

// ============================================================================
// BENCHMARKS
// ============================================================================

fn bench_claim_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("claim_candidates");
    for size in [10, 100, 1000] {
        let jobs = board(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &jobs, |b, jobs| {
            b.iter(|| claim_candidates(black_box(jobs)).len());
        });
    }
    group.finish();
}

fn bench_overlap_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlap_scan");
    for size in [10, 100, 1000] {
        let keys = lock_keys(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            b.iter(|| {
                keys.iter()
                    .any(|key| overlaps(black_box("src/module_3/new.rs"), key))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_claim_candidates, bench_overlap_scan);
criterion_main!(benches);
