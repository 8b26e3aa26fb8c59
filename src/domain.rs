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

//! Shared accounting across a family of dataspaces.

use crate::config::DataspaceConfig;
use crate::dataspace::Dataspace;
use crate::result::RangelockResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A family of dataspaces, typically every open object of one mount.
///
/// The domain counts the dataspaces created from it and the segments they currently hold,
/// which makes fragmentation visible across the whole family.
///
/// # Examples
///
/// ```rust
/// use spanlock::{Domain, LockMode, Span};
///
/// let domain = Domain::new();
/// let dataspace = domain.dataspace();
/// assert_eq!(domain.dataspace_count(), 1);
/// assert_eq!(domain.segment_count(), 1);
///
/// let guard = dataspace.lock_get(Span::new(0, 99), LockMode::Shared);
/// assert_eq!(domain.segment_count(), 3);
/// drop(guard);
/// assert_eq!(domain.segment_count(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Domain {
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    segments: AtomicUsize,
    dataspaces: AtomicUsize,
}

impl Domain {
    /// Creates an empty domain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dataspace in this domain with the default configuration.
    pub fn dataspace(&self) -> Dataspace {
        Dataspace::create(self.clone(), DataspaceConfig::default())
    }

    /// Creates a dataspace in this domain with the given configuration.
    pub fn dataspace_with_config(&self, config: DataspaceConfig) -> RangelockResult<Dataspace> {
        config.validate()?;
        Ok(Dataspace::create(self.clone(), config))
    }

    /// The number of segments currently held by the domain's dataspaces.
    pub fn segment_count(&self) -> usize {
        self.counters.segments.load(Ordering::Relaxed)
    }

    /// The number of live dataspaces in the domain.
    pub fn dataspace_count(&self) -> usize {
        self.counters.dataspaces.load(Ordering::Relaxed)
    }

    pub(crate) fn segments_allocated(&self, count: usize) {
        if count > 0 {
            self.counters.segments.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn segments_released(&self, count: usize) {
        if count > 0 {
            self.counters.segments.fetch_sub(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn dataspace_created(&self) {
        self.counters.dataspaces.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dataspace_destroyed(&self) {
        self.counters.dataspaces.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::LockMode;
    use crate::span::Span;
    use std::time::Duration;

    #[test]
    fn test_counts_follow_dataspaces() {
        let domain = Domain::new();
        let a = domain.dataspace();
        let b = domain.dataspace();
        assert_eq!(domain.dataspace_count(), 2);
        assert_eq!(domain.segment_count(), 2);

        let guard = a.lock_get(Span::new(10, 19), LockMode::Exclusive);
        let other = b.lock_get(Span::new(10, 19), LockMode::Exclusive);
        assert_eq!(domain.segment_count(), 6);

        drop(guard);
        assert_eq!(domain.segment_count(), 4);
        drop(a);
        assert_eq!(domain.dataspace_count(), 1);
        assert_eq!(domain.segment_count(), 3);

        drop(other);
        b.destroy();
        assert_eq!(domain.dataspace_count(), 0);
        assert_eq!(domain.segment_count(), 0);
    }

    #[test]
    fn test_dataspace_with_config_validates() {
        let domain = Domain::new();
        let config = DataspaceConfig::default().with_wait_timeout(Duration::ZERO);
        assert!(domain.dataspace_with_config(config).is_err());
        assert_eq!(domain.dataspace_count(), 0);
    }
}
