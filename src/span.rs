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

//! Inclusive offset ranges and the ordering used to place them in the segment tree.

use crate::result::{RangelockError, RangelockResult};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Bound, RangeBounds};

/// A signed byte offset within a dataspace.
pub type Offset = i64;

/// The lowest offset of every dataspace.
pub const OFFSET_MIN: Offset = i64::MIN;

/// The highest offset of every dataspace.
pub const OFFSET_MAX: Offset = i64::MAX;

/// A closed range of offsets `[begin, end]`.
///
/// Both ends are inclusive so that the whole `i64` domain can be described without a sentinel
/// one past the end. A `Span` is never empty.
///
/// # Examples
///
/// ```rust
/// use spanlock::Span;
///
/// let span = Span::new(0, 99);
/// assert_eq!(span.len(), 100);
/// assert!(span.contains(99));
/// assert!(!span.contains(100));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    begin: Offset,
    end: Offset,
}

impl Span {
    /// The span covering every offset.
    pub const FULL: Span = Span {
        begin: OFFSET_MIN,
        end: OFFSET_MAX,
    };

    /// Creates the span `[begin, end]`.
    ///
    /// # Panics
    ///
    /// Panics if `begin > end`.
    pub fn new(begin: Offset, end: Offset) -> Self {
        assert!(begin <= end, "span begin {begin} is past its end {end}");
        Span { begin, end }
    }

    /// Creates the span `[begin, end]`, rejecting `begin > end`.
    pub fn try_new(begin: Offset, end: Offset) -> RangelockResult<Self> {
        if begin > end {
            Err(RangelockError::InvalidRange { begin, end })
        } else {
            Ok(Span { begin, end })
        }
    }

    /// Creates the span of a single offset.
    pub fn point(offset: Offset) -> Self {
        Span {
            begin: offset,
            end: offset,
        }
    }

    /// Creates the span of `length` bytes starting at `offset`.
    ///
    /// An end that would overflow is clamped to [`OFFSET_MAX`] rather than wrapping. A zero
    /// length yields an end below `offset`, which is treated as an overflow as well.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spanlock::{Span, OFFSET_MAX};
    ///
    /// assert_eq!(Span::from_length(10, 5), Span::new(10, 14));
    /// assert_eq!(Span::from_length(OFFSET_MAX - 1, 100), Span::new(OFFSET_MAX - 1, OFFSET_MAX));
    /// assert_eq!(Span::from_length(10, 0), Span::new(10, OFFSET_MAX));
    /// ```
    pub fn from_length(offset: Offset, length: u64) -> Self {
        let end = match length {
            0 => OFFSET_MAX,
            _ => Offset::try_from(i128::from(offset) + i128::from(length) - 1)
                .unwrap_or(OFFSET_MAX),
        };
        Span { begin: offset, end }
    }

    /// Converts any `RangeBounds<i64>` into a span.
    ///
    /// Unbounded ends extend to the edge of the domain.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spanlock::{Span, OFFSET_MAX, OFFSET_MIN};
    ///
    /// assert_eq!(Span::from_bounds(0..100).unwrap(), Span::new(0, 99));
    /// assert_eq!(Span::from_bounds(0..=100).unwrap(), Span::new(0, 100));
    /// assert_eq!(Span::from_bounds(..).unwrap(), Span::new(OFFSET_MIN, OFFSET_MAX));
    /// assert!(Span::from_bounds(5..5).is_err());
    /// ```
    pub fn from_bounds<R: RangeBounds<Offset>>(range_bounds: R) -> RangelockResult<Self> {
        let begin = match range_bounds.start_bound() {
            Bound::Included(&n) => Some(n),
            Bound::Excluded(&n) => n.checked_add(1),
            Bound::Unbounded => Some(OFFSET_MIN),
        };
        let end = match range_bounds.end_bound() {
            Bound::Included(&n) => Some(n),
            Bound::Excluded(&n) => n.checked_sub(1),
            Bound::Unbounded => Some(OFFSET_MAX),
        };
        match (begin, end) {
            (Some(begin), Some(end)) => Span::try_new(begin, end),
            _ => Err(RangelockError::InvalidRange {
                begin: begin.unwrap_or(OFFSET_MAX),
                end: end.unwrap_or(OFFSET_MIN),
            }),
        }
    }

    /// The first offset of the span.
    pub fn begin(&self) -> Offset {
        self.begin
    }

    /// The last offset of the span.
    pub fn end(&self) -> Offset {
        self.end
    }

    /// The offset one past the end, or `None` when the span reaches [`OFFSET_MAX`].
    pub fn after(&self) -> Option<Offset> {
        self.end.checked_add(1)
    }

    /// The number of offsets in the span. The full domain saturates at `u64::MAX`.
    pub fn len(&self) -> u64 {
        self.end.abs_diff(self.begin).saturating_add(1)
    }

    /// Always `false`; spans hold at least one offset.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `offset` lies within the span.
    pub fn contains(&self, offset: Offset) -> bool {
        self.begin <= offset && offset <= self.end
    }

    /// Orders two spans for placement in the segment tree.
    ///
    /// `self` is `Less` when it ends before `other` begins and `Greater` when it begins after
    /// `other` ends. Overlapping spans compare `Equal`, which is what lets a single ordered
    /// structure answer both point lookups and overlap scans.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spanlock::Span;
    /// use std::cmp::Ordering;
    ///
    /// assert_eq!(Span::new(0, 9).compare(&Span::new(10, 19)), Ordering::Less);
    /// assert_eq!(Span::new(20, 29).compare(&Span::new(10, 19)), Ordering::Greater);
    /// assert_eq!(Span::new(5, 15).compare(&Span::new(10, 19)), Ordering::Equal);
    /// ```
    pub fn compare(&self, other: &Span) -> Ordering {
        if self.end < other.begin {
            Ordering::Less
        } else if self.begin > other.end {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Returns `true` if the two spans share at least one offset.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// Returns `true` if `other` begins exactly one past the end of `self`.
    pub fn precedes(&self, other: &Span) -> bool {
        self.after() == Some(other.begin)
    }

    pub(crate) fn set_begin(&mut self, begin: Offset) {
        debug_assert!(begin <= self.end);
        self.begin = begin;
    }

    pub(crate) fn set_end(&mut self, end: Offset) {
        debug_assert!(self.begin <= end);
        self.end = end;
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.begin, self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.begin, self.end)
    }
}
