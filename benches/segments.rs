//
// Copyright 2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use criterion::{black_box, BenchmarkId, Criterion};
use spanlock::{Dataspace, LockMode, Span};

pub fn bench_lock_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("LockPut");

    for mode in [LockMode::Shared, LockMode::Exclusive, LockMode::Modifying] {
        group.bench_with_input(BenchmarkId::new("idle", format!("{mode:?}")), &mode, |b, &mode| {
            let dataspace = Dataspace::new();
            b.iter(|| {
                let guard = dataspace.lock_get(black_box(Span::new(0, 4095)), mode);
                dataspace.lock_put(guard);
            });
        });
    }

    // Nested shared locks share boundaries and never split further
    group.bench_function("nested_shared", |b| {
        let dataspace = Dataspace::new();
        let _outer = dataspace.lock_get(Span::new(0, 4095), LockMode::Shared);
        b.iter(|| {
            let guard = dataspace.lock_get(black_box(Span::new(0, 4095)), LockMode::Shared);
            dataspace.lock_put(guard);
        });
    });

    group.finish();
}

pub fn bench_fragmented_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("FragmentedTree");

    for held in [16i64, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(held), &held, |b, &held| {
            let dataspace = Dataspace::new();
            // Every other page held, so the tree carries about twice as many segments
            let _guards: Vec<_> = (0..held)
                .map(|page| {
                    let span = Span::new(page * 8192, page * 8192 + 4095);
                    dataspace.lock_get(span, LockMode::Shared)
                })
                .collect();
            let middle = held / 2 * 8192 + 4096;
            b.iter(|| {
                let span = black_box(Span::new(middle, middle + 4095));
                let guard = dataspace.lock_get(span, LockMode::Exclusive);
                dataspace.lock_put(guard);
            });
        });
    }

    group.finish();
}

pub fn bench_try_lock_conflict(c: &mut Criterion) {
    let mut group = c.benchmark_group("TryLockConflict");

    group.bench_function("exclusive_over_shared", |b| {
        let dataspace = Dataspace::new();
        let _held = dataspace.lock_get(Span::new(1024, 2047), LockMode::Shared);
        b.iter(|| {
            black_box(dataspace.try_lock_get(Span::new(0, 4095), LockMode::Exclusive).is_err());
        });
    });

    group.finish();
}
