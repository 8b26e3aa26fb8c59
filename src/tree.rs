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

//! The segment tree: an ordered partition of the whole offset domain.
//!
//! Segments are keyed by their first offset. Because the segments always tile the domain with
//! no gaps, the segment containing an offset is the one with the greatest key at or below it,
//! and the segments overlapping a span are a contiguous run of keys.

use crate::segment::{LockMode, Segment, SegmentInfo, WaitChannel};
use crate::span::{Offset, Span, OFFSET_MIN};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) struct SegmentTree {
    segments: BTreeMap<Offset, Segment>,
}

impl SegmentTree {
    /// Creates a tree holding a single unlocked segment spanning the whole domain.
    pub(crate) fn new() -> Self {
        let mut segments = BTreeMap::new();
        segments.insert(OFFSET_MIN, Segment::new(Span::FULL));
        SegmentTree { segments }
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.segments.len() == 1 && self.segments.values().all(Segment::is_idle)
    }

    pub(crate) fn snapshot(&self) -> Vec<SegmentInfo> {
        self.segments.values().map(Segment::info).collect()
    }

    /// Keys of every segment overlapping `span`, in ascending order. Never empty.
    pub(crate) fn scan(&self, span: Span) -> Vec<Offset> {
        let first = self.containing(span.begin());
        self.segments
            .range(first..)
            .take_while(|(_, segment)| segment.span().compare(&span) == Ordering::Equal)
            .map(|(&key, _)| key)
            .collect()
    }

    /// Ensures a segment boundary exists exactly at `at`. Returns `true` if a segment was split.
    pub(crate) fn split_at(&mut self, at: Offset) -> bool {
        let key = self.containing(at);
        if key == at {
            return false;
        }
        let right = self.segment_mut(key).split_off(at);
        log::trace!(
            "split {:?} | {:?}",
            self.segment(key).span(),
            right.span()
        );
        self.segments.insert(at, right);
        true
    }

    /// Splits segments so that `span` is covered exactly. Returns the number of new segments.
    pub(crate) fn partition(&mut self, span: Span) -> usize {
        let mut created = usize::from(self.split_at(span.begin()));
        if let Some(after) = span.after() {
            created += usize::from(self.split_at(after));
        }
        created
    }

    /// Records a request over an exactly partitioned `span`: coverage on every segment, the left
    /// edge on the first and the right edge on the last.
    pub(crate) fn reference(&mut self, span: Span, mode: LockMode) {
        let keys = self.scan(span);
        debug_assert_eq!(keys.first(), Some(&span.begin()));
        let last = keys.len() - 1;
        for (index, key) in keys.into_iter().enumerate() {
            let segment = self.segment_mut(key);
            segment.cover(mode);
            if index == 0 {
                segment.acquire_left_edge();
            }
            if index == last {
                segment.acquire_right_edge();
            }
        }
    }

    /// Applies `mode` to the segments of `span` from left to right, stopping at the first
    /// segment that refuses it. Returns the key of that collision segment, if any.
    pub(crate) fn grant(&mut self, span: Span, mode: LockMode) -> Option<Offset> {
        for key in self.scan(span) {
            let segment = self.segment_mut(key);
            if !segment.try_grant(mode) {
                log::trace!(
                    "{mode:?} on {span} collides at {:?} (count {})",
                    segment.span(),
                    segment.access_count()
                );
                return Some(key);
            }
        }
        None
    }

    /// Rolls back the grants applied by a [`grant`](Self::grant) pass that stopped at
    /// `collision`. Coverage and edge references stay in place.
    pub(crate) fn undo(&mut self, span: Span, mode: LockMode, collision: Offset) {
        for key in self.scan(span).into_iter().take_while(|&key| key != collision) {
            self.segment_mut(key).revoke(mode);
        }
    }

    /// Marks the segment at `key` blocked and returns its wait channel.
    pub(crate) fn park(&mut self, key: Offset) -> Arc<WaitChannel> {
        self.segment_mut(key).park()
    }

    /// Reverses a full grant of `mode` over `span`, waking callers parked on segments that
    /// become unlocked.
    pub(crate) fn revoke(&mut self, span: Span, mode: LockMode) {
        for key in self.scan(span) {
            self.segment_mut(key).revoke(mode);
        }
    }

    /// Drops the references recorded by [`reference`](Self::reference) and merges segments
    /// whose shared boundary is no longer referenced. Merged-away segments are moved into
    /// `reaped` so the caller can free them after leaving the critical section.
    pub(crate) fn unreference(&mut self, span: Span, mode: LockMode, reaped: &mut Vec<Segment>) {
        let keys = self.scan(span);
        debug_assert_eq!(keys.first(), Some(&span.begin()));
        let last = keys.len() - 1;
        for (index, key) in keys.into_iter().enumerate() {
            let segment = self.segment_mut(key);
            segment.uncover(mode);
            if index == 0 {
                segment.release_left_edge();
            }
            if index == last {
                segment.release_right_edge();
            }
            let key = self.merge_left(key, reaped);
            if index == last {
                self.merge_right(key, reaped);
            }
        }
    }

    /// Merges the segment at `key` with its left neighbour when nothing references their shared
    /// boundary and their states match. Returns the key of the surviving segment.
    fn merge_left(&mut self, key: Offset, reaped: &mut Vec<Segment>) -> Offset {
        let Some((&prev_key, prev)) = self.segments.range(..key).next_back() else {
            return key;
        };
        let current = self.segment(key);
        if current.left_refs() != 0 || prev.right_refs() != 0 || !prev.is_compatible(current) {
            return key;
        }
        let mut prev = self.take(prev_key);
        let mut current = self.take(key);
        current.absorb_left(&mut prev);
        log::trace!("merged left into {:?}", current.span());
        self.segments.insert(prev_key, current);
        reaped.push(prev);
        prev_key
    }

    /// Merges the segment at `key` with its right neighbour under the same rule as
    /// [`merge_left`](Self::merge_left).
    fn merge_right(&mut self, key: Offset, reaped: &mut Vec<Segment>) {
        let current = self.segment(key);
        let Some(next_key) = current.span().after() else {
            return;
        };
        let next = self.segment(next_key);
        if current.right_refs() != 0 || next.left_refs() != 0 || !current.is_compatible(next) {
            return;
        }
        let mut next = self.take(next_key);
        let current = self.segment_mut(key);
        current.absorb_right(&mut next);
        log::trace!("merged right into {:?}", current.span());
        reaped.push(next);
    }

    fn containing(&self, offset: Offset) -> Offset {
        match self.segments.range(..=offset).next_back() {
            Some((&key, _)) => key,
            None => panic!("segment tree has no segment containing {offset}"),
        }
    }

    fn segment(&self, key: Offset) -> &Segment {
        match self.segments.get(&key) {
            Some(segment) => segment,
            None => panic!("segment tree has no segment at {key}"),
        }
    }

    fn segment_mut(&mut self, key: Offset) -> &mut Segment {
        match self.segments.get_mut(&key) {
            Some(segment) => segment,
            None => panic!("segment tree has no segment at {key}"),
        }
    }

    fn take(&mut self, key: Offset) -> Segment {
        match self.segments.remove(&key) {
            Some(segment) => segment,
            None => panic!("segment tree has no segment at {key}"),
        }
    }

    /// Panics unless the segments tile the domain and every segment's bookkeeping is coherent.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let mut expected = Some(OFFSET_MIN);
        for (&key, segment) in &self.segments {
            let info = segment.info();
            assert_eq!(Some(key), expected, "gap or overlap at {:?}", info.span);
            assert_eq!(key, info.span.begin());
            assert!(info.modify_depth == 0 || info.access_count < 0, "{info:?}");
            assert!(info.access_count == 0 || info.coverage_refs > 0, "{info:?}");
            assert!(info.left_refs <= info.coverage_refs, "{info:?}");
            assert!(info.right_refs <= info.coverage_refs, "{info:?}");
            expected = info.span.after();
        }
        assert_eq!(expected, None, "segments stop short of the end of the domain");
    }

    /// Clears a segment's blocked flag without waking anyone, simulating a lost wakeup.
    #[cfg(test)]
    pub(crate) fn forget_waiters(&mut self, offset: Offset) {
        let key = self.containing(offset);
        self.segment_mut(key).forget_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::CacheState;
    use crate::span::OFFSET_MAX;

    fn acquire(tree: &mut SegmentTree, span: Span, mode: LockMode) -> Option<Offset> {
        tree.partition(span);
        tree.reference(span, mode);
        let collision = tree.grant(span, mode);
        if let Some(collision) = collision {
            tree.undo(span, mode, collision);
        }
        collision
    }

    fn release(tree: &mut SegmentTree, span: Span, mode: LockMode) -> usize {
        let mut reaped = Vec::new();
        tree.revoke(span, mode);
        tree.unreference(span, mode, &mut reaped);
        reaped.len()
    }

    fn spans(tree: &SegmentTree) -> Vec<(Offset, Offset, i32)> {
        tree.snapshot()
            .into_iter()
            .map(|info| (info.span.begin(), info.span.end(), info.access_count))
            .collect()
    }

    #[test]
    fn test_new_tree_covers_domain() {
        let tree = SegmentTree::new();
        assert_eq!(tree.len(), 1);
        assert!(tree.is_idle());
        assert_eq!(tree.snapshot()[0].span, Span::FULL);
        tree.assert_invariants();
    }

    #[test]
    fn test_scan_finds_overlapping_run() {
        let mut tree = SegmentTree::new();
        tree.split_at(0);
        tree.split_at(10);
        tree.split_at(20);
        assert_eq!(tree.scan(Span::new(5, 15)), vec![0, 10]);
        assert_eq!(tree.scan(Span::new(10, 19)), vec![10]);
        assert_eq!(tree.scan(Span::point(-1)), vec![OFFSET_MIN]);
        assert_eq!(tree.scan(Span::FULL), vec![OFFSET_MIN, 0, 10, 20]);
        tree.assert_invariants();
    }

    #[test]
    fn test_split_at_existing_boundary_is_noop() {
        let mut tree = SegmentTree::new();
        assert!(tree.split_at(0));
        assert!(!tree.split_at(0));
        assert!(!tree.split_at(OFFSET_MIN));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_partition_creates_exact_boundaries() {
        let mut tree = SegmentTree::new();
        assert_eq!(tree.partition(Span::new(0, 99)), 2);
        assert_eq!(
            spans(&tree),
            vec![(OFFSET_MIN, -1, 0), (0, 99, 0), (100, OFFSET_MAX, 0)]
        );
        assert_eq!(tree.partition(Span::new(0, OFFSET_MAX)), 0);
        assert_eq!(tree.partition(Span::FULL), 0);
        tree.assert_invariants();
    }

    #[test]
    fn test_overlapping_shared_grants() {
        let mut tree = SegmentTree::new();
        assert_eq!(acquire(&mut tree, Span::new(0, 99), LockMode::Shared), None);
        assert_eq!(acquire(&mut tree, Span::new(50, 149), LockMode::Shared), None);
        assert_eq!(
            spans(&tree),
            vec![
                (OFFSET_MIN, -1, 0),
                (0, 49, 1),
                (50, 99, 2),
                (100, 149, 1),
                (150, OFFSET_MAX, 0),
            ]
        );
        tree.assert_invariants();

        release(&mut tree, Span::new(0, 99), LockMode::Shared);
        tree.assert_invariants();
        release(&mut tree, Span::new(50, 149), LockMode::Shared);
        assert!(tree.is_idle());
    }

    #[test]
    fn test_collision_keeps_partition_and_coverage() {
        let mut tree = SegmentTree::new();
        assert_eq!(acquire(&mut tree, Span::new(40, 59), LockMode::Exclusive), None);
        assert_eq!(acquire(&mut tree, Span::new(0, 99), LockMode::Shared), Some(40));

        let segments = tree.snapshot();
        let covered: Vec<_> = segments
            .iter()
            .filter(|info| info.span.overlaps(&Span::new(0, 99)))
            .collect();
        assert_eq!(covered.len(), 3);
        assert_eq!(covered[0].span, Span::new(0, 39));
        assert_eq!(covered[0].access_count, 0);
        assert_eq!((covered[0].coverage_refs, covered[0].left_refs), (1, 1));
        assert_eq!(covered[1].access_count, -1);
        assert_eq!(covered[1].coverage_refs, 2);
        assert_eq!(covered[1].state, CacheState::Exclusive);
        assert_eq!(covered[2].span, Span::new(60, 99));
        assert_eq!(covered[2].access_count, 0);
        assert_eq!((covered[2].coverage_refs, covered[2].right_refs), (1, 1));
        tree.assert_invariants();

        release(&mut tree, Span::new(40, 59), LockMode::Exclusive);
        assert_eq!(tree.grant(Span::new(0, 99), LockMode::Shared), None);
        release(&mut tree, Span::new(0, 99), LockMode::Shared);
        assert!(tree.is_idle());
    }

    #[test]
    fn test_adjacent_releases_merge_back() {
        for reverse in [false, true] {
            let mut tree = SegmentTree::new();
            let a = Span::new(0, 49);
            let b = Span::new(50, 99);
            assert_eq!(acquire(&mut tree, a, LockMode::Shared), None);
            assert_eq!(acquire(&mut tree, b, LockMode::Shared), None);
            assert_eq!(tree.len(), 4);
            let (first, second) = if reverse { (b, a) } else { (a, b) };
            release(&mut tree, first, LockMode::Shared);
            tree.assert_invariants();
            release(&mut tree, second, LockMode::Shared);
            assert!(tree.is_idle());
        }
    }

    #[test]
    fn test_release_merges_interior_boundary() {
        // The boundary at 50 loses its last reference while the two sides still differ in
        // state; it must still be merged away once the covering request is gone.
        let mut tree = SegmentTree::new();
        let inner = Span::new(0, 49);
        let outer = Span::new(0, 99);
        assert_eq!(acquire(&mut tree, inner, LockMode::Exclusive), None);
        assert_eq!(acquire(&mut tree, outer, LockMode::Shared), Some(0));
        release(&mut tree, inner, LockMode::Exclusive);
        assert_eq!(tree.grant(outer, LockMode::Shared), None);
        release(&mut tree, outer, LockMode::Shared);
        assert!(tree.is_idle());
    }

    #[test]
    fn test_merge_requires_matching_state() {
        let mut tree = SegmentTree::new();
        assert_eq!(acquire(&mut tree, Span::new(0, 9), LockMode::Shared), None);
        assert_eq!(acquire(&mut tree, Span::new(10, 19), LockMode::Exclusive), None);
        assert_eq!(acquire(&mut tree, Span::new(0, 9), LockMode::Shared), None);
        release(&mut tree, Span::new(0, 9), LockMode::Shared);
        assert_eq!(
            spans(&tree),
            vec![
                (OFFSET_MIN, -1, 0),
                (0, 9, 1),
                (10, 19, -1),
                (20, OFFSET_MAX, 0),
            ]
        );
        release(&mut tree, Span::new(10, 19), LockMode::Exclusive);
        assert_eq!(tree.len(), 3);
        release(&mut tree, Span::new(0, 9), LockMode::Shared);
        assert!(tree.is_idle());
    }

    #[test]
    fn test_release_reaps_merged_segments() {
        let mut tree = SegmentTree::new();
        assert_eq!(acquire(&mut tree, Span::new(0, 9), LockMode::Modifying), None);
        assert_eq!(tree.len(), 3);
        assert_eq!(release(&mut tree, Span::new(0, 9), LockMode::Modifying), 2);
        assert!(tree.is_idle());
    }

    #[test]
    fn test_domain_edges() {
        let mut tree = SegmentTree::new();
        let low = Span::new(OFFSET_MIN, OFFSET_MIN);
        let high = Span::new(OFFSET_MAX - 1, OFFSET_MAX);
        assert_eq!(acquire(&mut tree, low, LockMode::Exclusive), None);
        assert_eq!(acquire(&mut tree, high, LockMode::Exclusive), None);
        assert_eq!(tree.len(), 3);
        tree.assert_invariants();
        assert_eq!(acquire(&mut tree, Span::FULL, LockMode::Shared), Some(OFFSET_MIN));
        release(&mut tree, low, LockMode::Exclusive);
        release(&mut tree, high, LockMode::Exclusive);
        assert_eq!(tree.grant(Span::FULL, LockMode::Shared), None);
        release(&mut tree, Span::FULL, LockMode::Shared);
        assert!(tree.is_idle());
    }
}
