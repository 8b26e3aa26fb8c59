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

//! Segments: the nodes of the segment tree and their access state.

use crate::span::{Offset, Span};
use parking_lot::{Condvar, MutexGuard, WaitTimeoutResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The access a lock request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Any number of shared holders may overlap.
    Shared,
    /// A single holder; excludes every other mode.
    Exclusive,
    /// A single holder that intends to modify the range; excludes every other mode.
    Modifying,
}

/// The highest mode requested by any lock currently covering a segment.
///
/// Requests still waiting for their grant count as covering. Coverage is counted per mode, so
/// the label falls back as soon as the strongest covering request leaves, and reads `Invalid`
/// once nothing covers the segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheState {
    /// Not covered by any request.
    #[default]
    Invalid,
    /// Covered by shared requests only.
    Shared,
    /// Covered by at least one exclusive request.
    Exclusive,
    /// Covered by at least one modifying request.
    Modified,
}

impl From<LockMode> for CacheState {
    fn from(mode: LockMode) -> Self {
        match mode {
            LockMode::Shared => CacheState::Shared,
            LockMode::Exclusive => CacheState::Exclusive,
            LockMode::Modifying => CacheState::Modified,
        }
    }
}

/// Covering requests on a segment, counted per requested mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Coverage {
    shared: u32,
    exclusive: u32,
    modifying: u32,
}

impl Coverage {
    fn count_mut(&mut self, mode: LockMode) -> &mut u32 {
        match mode {
            LockMode::Shared => &mut self.shared,
            LockMode::Exclusive => &mut self.exclusive,
            LockMode::Modifying => &mut self.modifying,
        }
    }

    fn total(&self) -> u32 {
        self.shared + self.exclusive + self.modifying
    }

    fn state(&self) -> CacheState {
        if self.modifying > 0 {
            CacheState::Modified
        } else if self.exclusive > 0 {
            CacheState::Exclusive
        } else if self.shared > 0 {
            CacheState::Shared
        } else {
            CacheState::Invalid
        }
    }
}

/// The channel callers park on while a segment refuses their mode.
///
/// Both halves of a split segment hold the same channel. Waking it through either half marks it
/// spent, so the other half no longer reports parked callers and parks new ones on a fresh
/// channel.
#[derive(Debug, Default)]
pub(crate) struct WaitChannel {
    condvar: Condvar,
    woken: AtomicBool,
}

impl WaitChannel {
    /// Blocks on the channel, releasing `guard` until woken or `timeout` elapses.
    pub(crate) fn wait_for<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
    ) -> WaitTimeoutResult {
        self.condvar.wait_for(guard, timeout)
    }

    fn is_spent(&self) -> bool {
        self.woken.load(Ordering::Relaxed)
    }

    fn wake(&self) {
        self.woken.store(true, Ordering::Relaxed);
        self.condvar.notify_all();
    }
}

/// A point-in-time copy of one segment's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentInfo {
    /// The offsets covered by the segment.
    pub span: Span,
    /// `0` unlocked, `n > 0` shared holders, `< 0` a single exclusive or modifying holder.
    pub access_count: i32,
    /// Modifying grants attributed to the segment.
    pub modify_depth: u32,
    /// Outstanding requests beginning exactly at the segment's first offset.
    pub left_refs: u32,
    /// Outstanding requests ending exactly at the segment's last offset.
    pub right_refs: u32,
    /// Outstanding requests covering the segment.
    pub coverage_refs: u32,
    /// Highest mode requested by a covering request.
    pub state: CacheState,
    /// Whether some caller is parked waiting on the segment.
    pub blocked: bool,
}

impl SegmentInfo {
    /// Returns `true` if no lock is granted on the segment.
    pub fn is_unlocked(&self) -> bool {
        self.access_count == 0
    }
}

/// One contiguous range of the dataspace and everything known about the locks touching it.
#[derive(Debug)]
pub(crate) struct Segment {
    span: Span,
    access_count: i32,
    modify_depth: u32,
    left_refs: u32,
    right_refs: u32,
    coverage: Coverage,
    waiters: Option<Arc<WaitChannel>>,
}

impl Segment {
    pub(crate) fn new(span: Span) -> Self {
        Segment {
            span,
            access_count: 0,
            modify_depth: 0,
            left_refs: 0,
            right_refs: 0,
            coverage: Coverage::default(),
            waiters: None,
        }
    }

    pub(crate) fn span(&self) -> Span {
        self.span
    }

    pub(crate) fn access_count(&self) -> i32 {
        self.access_count
    }

    pub(crate) fn left_refs(&self) -> u32 {
        self.left_refs
    }

    pub(crate) fn right_refs(&self) -> u32 {
        self.right_refs
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.access_count == 0
            && self.modify_depth == 0
            && self.left_refs == 0
            && self.right_refs == 0
            && self.coverage.total() == 0
    }

    /// Attempts to apply `mode` to the segment. Returns `false` on a collision, leaving the
    /// segment untouched.
    pub(crate) fn try_grant(&mut self, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => {
                if self.access_count < 0 {
                    return false;
                }
                self.access_count += 1;
            }
            LockMode::Exclusive => {
                if self.access_count != 0 {
                    return false;
                }
                self.access_count = -1;
            }
            LockMode::Modifying => {
                if self.access_count != 0 {
                    return false;
                }
                self.access_count = -1;
                self.modify_depth += 1;
            }
        }
        true
    }

    /// Reverses a grant of `mode`. Parked callers are woken once the segment is unlocked.
    pub(crate) fn revoke(&mut self, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                assert!(self.access_count > 0, "shared revoke on {:?}", self.span);
                self.access_count -= 1;
            }
            LockMode::Exclusive => {
                assert!(self.access_count < 0, "exclusive revoke on {:?}", self.span);
                self.access_count += 1;
            }
            LockMode::Modifying => {
                assert!(
                    self.access_count < 0 && self.modify_depth > 0,
                    "modifying revoke on {:?}",
                    self.span
                );
                self.modify_depth -= 1;
                self.access_count += 1;
            }
        }
        if self.access_count == 0 {
            self.wake();
        }
    }

    pub(crate) fn cover(&mut self, mode: LockMode) {
        *self.coverage.count_mut(mode) += 1;
    }

    /// Drops a covering request of `mode`. The cache state falls back to the highest mode still
    /// covering the segment.
    pub(crate) fn uncover(&mut self, mode: LockMode) {
        let count = self.coverage.count_mut(mode);
        assert!(*count > 0, "{mode:?} coverage underflow on {:?}", self.span);
        *count -= 1;
    }

    pub(crate) fn state(&self) -> CacheState {
        self.coverage.state()
    }

    pub(crate) fn acquire_left_edge(&mut self) {
        self.left_refs += 1;
    }

    pub(crate) fn acquire_right_edge(&mut self) {
        self.right_refs += 1;
    }

    pub(crate) fn release_left_edge(&mut self) {
        assert!(self.left_refs > 0, "left edge underflow on {:?}", self.span);
        self.left_refs -= 1;
    }

    pub(crate) fn release_right_edge(&mut self) {
        assert!(self.right_refs > 0, "right edge underflow on {:?}", self.span);
        self.right_refs -= 1;
    }

    /// Splits the segment so that a boundary exists at `at`. `self` keeps `[begin, at - 1]` and
    /// the returned segment takes `[at, end]`.
    ///
    /// Both halves keep the counts, coverage and state; requests covering the whole cover both
    /// halves. Nothing references the new boundary yet, so the edge counts facing it start at
    /// zero. Callers parked on the original are parked on both halves.
    pub(crate) fn split_off(&mut self, at: Offset) -> Segment {
        debug_assert!(self.span.begin() < at && at <= self.span.end());
        let right = Segment {
            span: Span::new(at, self.span.end()),
            left_refs: 0,
            waiters: self.waiters.clone(),
            ..*self
        };
        self.span.set_end(at - 1);
        self.right_refs = 0;
        right
    }

    /// Returns `true` if the two segments carry identical access state.
    pub(crate) fn is_compatible(&self, other: &Segment) -> bool {
        self.access_count == other.access_count
            && self.modify_depth == other.modify_depth
            && self.state() == other.state()
    }

    /// Extends the segment leftward over `left`, which is being removed from the tree.
    pub(crate) fn absorb_left(&mut self, left: &mut Segment) {
        debug_assert!(left.span.precedes(&self.span));
        debug_assert_eq!(left.coverage, self.coverage);
        self.span.set_begin(left.span.begin());
        self.left_refs = left.left_refs;
        left.wake();
    }

    /// Extends the segment rightward over `right`, which is being removed from the tree.
    pub(crate) fn absorb_right(&mut self, right: &mut Segment) {
        debug_assert!(self.span.precedes(&right.span));
        debug_assert_eq!(right.coverage, self.coverage);
        self.span.set_end(right.span.end());
        self.right_refs = right.right_refs;
        right.wake();
    }

    /// Marks the segment blocked and returns the channel to wait on.
    pub(crate) fn park(&mut self) -> Arc<WaitChannel> {
        let waiters = match self.waiters.take() {
            Some(waiters) if !waiters.is_spent() => waiters,
            _ => Arc::default(),
        };
        self.waiters = Some(Arc::clone(&waiters));
        waiters
    }

    /// Clears the blocked flag, waking every caller parked on the segment.
    pub(crate) fn wake(&mut self) -> bool {
        match self.waiters.take() {
            Some(waiters) if !waiters.is_spent() => {
                waiters.wake();
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn forget_waiters(&mut self) {
        self.waiters = None;
    }

    pub(crate) fn info(&self) -> SegmentInfo {
        SegmentInfo {
            span: self.span,
            access_count: self.access_count,
            modify_depth: self.modify_depth,
            left_refs: self.left_refs,
            right_refs: self.right_refs,
            coverage_refs: self.coverage.total(),
            state: self.state(),
            blocked: self.waiters.as_ref().is_some_and(|waiters| !waiters.is_spent()),
        }
    }
}
