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

//! Implementation of the blocking range lock over a dataspace.

use crate::config::DataspaceConfig;
use crate::domain::Domain;
use crate::io::IoRequest;
use crate::result::{RangelockError, RangelockResult};
use crate::segment::{LockMode, Segment, SegmentInfo};
use crate::span::{Offset, Span};
use crate::tree::SegmentTree;
use parking_lot::Mutex;
use std::ops::RangeBounds;
use std::sync::Arc;

/// A range lock manager for one addressable object, such as the data of an open file.
///
/// The dataspace partitions the whole `i64` offset domain into segments. Acquiring a lock
/// splits segments so the requested range is covered exactly, then grants the requested mode
/// on every covered segment or none of them. Releasing reverses the grant and merges segments
/// back together once no lock needs the boundary between them.
///
/// # Features
///
/// - Any number of shared locks may overlap
/// - Exclusive and modifying locks exclude every other lock on the offsets they cover
/// - Locks on disjoint ranges never wait for each other
/// - A blocked acquire holds no grants while it waits, so overlapping requests cannot deadlock
/// - RAII-style guards release their lock on drop
///
/// # Examples
///
/// ```rust
/// use spanlock::{Dataspace, LockMode, Span};
///
/// let dataspace = Dataspace::new();
///
/// let read = dataspace.lock_get(Span::new(0, 99), LockMode::Shared);
/// let other_read = dataspace.lock_get(Span::new(50, 149), LockMode::Shared);
/// let write = dataspace.lock_get(Span::new(200, 299), LockMode::Modifying);
///
/// // Overlaps a shared lock
/// assert!(dataspace.try_lock_get(Span::new(90, 209), LockMode::Exclusive).is_err());
///
/// dataspace.lock_put(read);
/// drop(other_read);
/// write.release();
/// assert!(dataspace.is_idle());
/// ```
pub struct Dataspace {
    inner: Arc<Shared>,
}

impl Dataspace {
    /// Creates a dataspace with the default configuration in a private domain.
    pub fn new() -> Self {
        Domain::new().dataspace()
    }

    /// Creates a dataspace with `config` in a private domain.
    pub fn with_config(config: DataspaceConfig) -> RangelockResult<Self> {
        Domain::new().dataspace_with_config(config)
    }

    pub(crate) fn create(domain: Domain, config: DataspaceConfig) -> Self {
        domain.dataspace_created();
        domain.segments_allocated(1);
        Self {
            inner: Arc::new(Shared {
                tree: Mutex::new(SegmentTree::new()),
                config,
                domain,
            }),
        }
    }

    /// The configuration the dataspace was created with.
    pub fn config(&self) -> &DataspaceConfig {
        &self.inner.config
    }

    /// The domain the dataspace belongs to.
    pub fn domain(&self) -> &Domain {
        &self.inner.domain
    }

    /// Acquires `mode` over `span`, blocking until every offset in it can be granted.
    ///
    /// Nothing is held while blocked. Each attempt either grants the whole span or rolls back
    /// what it had granted and waits on the first segment that refused. The wait ends when that
    /// segment is unlocked or merged away, or after the configured wait timeout; then the span
    /// is scanned again.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spanlock::{Dataspace, LockMode, Span};
    ///
    /// let dataspace = Dataspace::new();
    /// let guard = dataspace.lock_get(Span::new(0, 4095), LockMode::Exclusive);
    /// assert_eq!(guard.span(), Span::new(0, 4095));
    /// assert_eq!(guard.mode(), LockMode::Exclusive);
    /// ```
    pub fn lock_get(&self, span: Span, mode: LockMode) -> RangeLockGuard {
        let mut tree = self.inner.tree.lock();
        self.inner.domain.segments_allocated(tree.partition(span));
        tree.reference(span, mode);

        while let Some(collision) = tree.grant(span, mode) {
            tree.undo(span, mode, collision);
            let waiters = tree.park(collision);
            log::debug!("{mode:?} lock on {span} waiting on segment at {collision}");
            if waiters
                .wait_for(&mut tree, self.inner.config.wait_timeout())
                .timed_out()
            {
                log::debug!("{mode:?} lock on {span} timed out waiting, rescanning");
            }
        }
        drop(tree);

        log::trace!("granted {mode:?} lock on {span}");
        RangeLockGuard {
            inner: self.inner.clone(),
            span,
            mode,
        }
    }

    /// Acquires `mode` over a range given as `RangeBounds<i64>`, blocking like
    /// [`lock_get`](Self::lock_get).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spanlock::{Dataspace, LockMode, Span};
    ///
    /// let dataspace = Dataspace::new();
    /// let guard = dataspace.lock_range(100..200, LockMode::Shared).unwrap();
    /// assert_eq!(guard.span(), Span::new(100, 199));
    /// let tail = dataspace.lock_range(1000.., LockMode::Shared).unwrap();
    /// assert!(dataspace.lock_range(5..5, LockMode::Shared).is_err());
    /// ```
    pub fn lock_range<R>(&self, range_bounds: R, mode: LockMode) -> RangelockResult<RangeLockGuard>
    where
        R: RangeBounds<Offset>,
    {
        Ok(self.lock_get(Span::from_bounds(range_bounds)?, mode))
    }

    /// Acquires a lock for an I/O request: reads are shared, writes are modifying.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spanlock::{Dataspace, IoRequest, LockMode, Span};
    ///
    /// let dataspace = Dataspace::new();
    /// let guard = dataspace.lock_get_from_io(&IoRequest::read(0, 512));
    /// assert_eq!(guard.span(), Span::new(0, 511));
    /// assert_eq!(guard.mode(), LockMode::Shared);
    /// ```
    pub fn lock_get_from_io(&self, io: &IoRequest) -> RangeLockGuard {
        self.lock_get(io.span(), io.mode())
    }

    /// Attempts to acquire `mode` over `span` without blocking.
    ///
    /// # Returns
    ///
    /// * `Ok(RangeLockGuard)` if the whole span was granted
    /// * `Err(RangelockError::RangeAlreadyLocked)` if some offset is held in an incompatible
    ///   mode; the dataspace is left as it was
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spanlock::{Dataspace, LockMode, RangelockError, Span};
    ///
    /// let dataspace = Dataspace::new();
    /// let _write = dataspace.try_lock_get(Span::new(0, 9), LockMode::Modifying).unwrap();
    /// assert_eq!(
    ///     dataspace.try_lock_get(Span::new(5, 14), LockMode::Shared).unwrap_err(),
    ///     RangelockError::RangeAlreadyLocked(Span::new(5, 14))
    /// );
    /// ```
    pub fn try_lock_get(&self, span: Span, mode: LockMode) -> RangelockResult<RangeLockGuard> {
        let mut reaped = Vec::new();
        let mut tree = self.inner.tree.lock();
        self.inner.domain.segments_allocated(tree.partition(span));
        tree.reference(span, mode);
        let collision = tree.grant(span, mode);
        if let Some(collision) = collision {
            tree.undo(span, mode, collision);
            tree.unreference(span, mode, &mut reaped);
        }
        drop(tree);

        if collision.is_some() {
            self.inner.reclaim(reaped);
            return Err(RangelockError::RangeAlreadyLocked(span));
        }
        log::trace!("granted {mode:?} lock on {span}");
        Ok(RangeLockGuard {
            inner: self.inner.clone(),
            span,
            mode,
        })
    }

    /// Releases a lock acquired from this dataspace.
    pub fn lock_put(&self, guard: RangeLockGuard) {
        debug_assert!(
            Arc::ptr_eq(&self.inner, &guard.inner),
            "lock on {} released on a foreign dataspace",
            guard.span
        );
        drop(guard);
    }

    /// Tears the dataspace down.
    ///
    /// Outstanding guards keep the segment tree alive until they are dropped, so destroying a
    /// dataspace with locks held is safe but pointless.
    pub fn destroy(self) {
        let outstanding = Arc::strong_count(&self.inner) - 1;
        if outstanding > 0 {
            log::warn!("dataspace destroyed with {outstanding} locks outstanding");
        }
    }

    /// Returns an ordered snapshot of every segment.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.inner.tree.lock().snapshot()
    }

    /// The number of segments the domain is currently partitioned into.
    pub fn segment_count(&self) -> usize {
        self.inner.tree.lock().len()
    }

    /// Returns `true` if the dataspace is back to a single unreferenced segment.
    pub fn is_idle(&self) -> bool {
        self.inner.tree.lock().is_idle()
    }
}

impl Default for Dataspace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dataspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dataspace {{ .. }}")
    }
}

struct Shared {
    tree: Mutex<SegmentTree>,
    config: DataspaceConfig,
    domain: Domain,
}

impl Shared {
    fn release(&self, span: Span, mode: LockMode) {
        let mut reaped = Vec::new();
        {
            let mut tree = self.tree.lock();
            tree.revoke(span, mode);
            tree.unreference(span, mode, &mut reaped);
        }
        log::trace!("released {mode:?} lock on {span}");
        self.reclaim(reaped);
    }

    /// Frees merged-away segments. Called with the tree unlocked.
    fn reclaim(&self, reaped: Vec<Segment>) {
        if reaped.is_empty() {
            return;
        }
        log::trace!("reclaiming {} merged segments", reaped.len());
        self.domain.segments_released(reaped.len());
        drop(reaped);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let tree = self.tree.get_mut();
        log::debug!("tearing down dataspace with {} segments", tree.len());
        self.domain.segments_released(tree.len());
        self.domain.dataspace_destroyed();
    }
}

/// A RAII guard for a granted range lock.
///
/// This guard is created by [`Dataspace::lock_get`] and its variants. When the guard is
/// dropped, or passed to [`Dataspace::lock_put`], the lock is released and any callers waiting
/// on the freed segments are woken.
///
/// # Examples
///
/// ```rust
/// use spanlock::{Dataspace, LockMode, Span};
///
/// let dataspace = Dataspace::new();
/// {
///     let _guard = dataspace.lock_get(Span::new(0, 9), LockMode::Exclusive);
///     assert!(!dataspace.is_idle());
/// }
/// assert!(dataspace.is_idle());
/// ```
pub struct RangeLockGuard {
    inner: Arc<Shared>,
    span: Span,
    mode: LockMode,
}

impl RangeLockGuard {
    /// Returns the range that this guard is locking.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Returns the mode the range is held in.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Releases the lock.
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for RangeLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeLockGuard")
            .field("span", &self.span)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for RangeLockGuard {
    fn drop(&mut self) {
        self.inner.release(self.span, self.mode);
    }
}
