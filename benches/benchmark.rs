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

use criterion::{criterion_group, criterion_main};

mod segments;

criterion_group!(
    segments,
    segments::bench_lock_put,
    segments::bench_fragmented_tree,
    segments::bench_try_lock_conflict
);
criterion_group!(contention, contention::bench_contention);
criterion_main!(segments, contention);
