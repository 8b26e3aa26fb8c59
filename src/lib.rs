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

//! # Spanlock
//!
//! A Rust library for coordinating concurrent access to byte ranges of a shared object, such as
//! the data of a file, by locking arbitrary inclusive offset ranges instead of the whole object.
//!
//! Each object gets a [`Dataspace`]. A dataspace partitions the full `i64` offset domain into
//! an ordered set of segments and tracks, per segment, how many shared holders it has or whether
//! it is held exclusively. Acquiring a lock splits segments so the requested range is covered
//! exactly; releasing merges them back once nothing needs the boundary.
//!
//! ## Key Features
//!
//! - **Three Lock Modes**: Shared, exclusive, and modifying (an exclusive write lock that
//!   also marks the range dirty)
//! - **All-or-nothing Acquisition**: A lock is granted on its whole range or on none of it
//! - **Deadlock-free Blocking**: A blocked caller holds no grants while it waits
//! - **Cache State Labels**: Every segment carries the strongest mode it is covered in
//! - **RAII Guards**: Automatic lock release through guard pattern
//! - **Flexible Range Specification**: Spans, standard range syntax, or I/O descriptors
//!
//! ## Usage Examples
//!
//! ### Basic Locking
//!
//! ```rust
//! use spanlock::{Dataspace, LockMode, Span};
//!
//! let dataspace = Dataspace::new();
//!
//! // Multiple readers can hold overlapping ranges
//! let reader = dataspace.lock_get(Span::new(0, 99), LockMode::Shared);
//! let another_reader = dataspace.lock_get(Span::new(50, 149), LockMode::Shared);
//!
//! // A writer on a disjoint range does not wait
//! let writer = dataspace.lock_get(Span::new(200, 299), LockMode::Modifying);
//!
//! // A writer on an overlapping range would
//! assert!(dataspace.try_lock_get(Span::new(100, 199), LockMode::Exclusive).is_err());
//!
//! dataspace.lock_put(reader);
//! dataspace.lock_put(another_reader);
//! dataspace.lock_put(writer);
//! assert!(dataspace.is_idle());
//! ```
//!
//! ### I/O Descriptors
//!
//! ```rust
//! use spanlock::{Dataspace, IoRequest};
//!
//! let dataspace = Dataspace::new();
//!
//! // Reads lock shared, writes lock modifying
//! let read = dataspace.lock_get_from_io(&IoRequest::read(0, 4096));
//! let write = dataspace.lock_get_from_io(&IoRequest::write(4096, 4096));
//! ```
//!
//! ## Range Specifications
//!
//! ```rust
//! use spanlock::{Dataspace, LockMode};
//!
//! let dataspace = Dataspace::new();
//!
//! // Exclusive range
//! let guard1 = dataspace.lock_range(0..100, LockMode::Shared);
//!
//! // Inclusive range
//! let guard2 = dataspace.lock_range(200..=299, LockMode::Shared);
//!
//! // Range from start
//! let guard3 = dataspace.lock_range(..300, LockMode::Shared);
//!
//! // Range to end
//! let guard4 = dataspace.lock_range(900.., LockMode::Shared);
//!
//! // Full range
//! let guard5 = dataspace.lock_range(.., LockMode::Shared);
//! ```
//!
//! ## Domains
//!
//! Dataspaces created from the same [`Domain`] share accounting of how many segments and
//! dataspaces are alive:
//!
//! ```rust
//! use spanlock::{Domain, LockMode, Span};
//!
//! let domain = Domain::new();
//! let a = domain.dataspace();
//! let b = domain.dataspace();
//! let guard = a.lock_get(Span::new(10, 19), LockMode::Exclusive);
//! assert_eq!(domain.dataspace_count(), 2);
//! assert_eq!(domain.segment_count(), 4);
//! ```
//!
//! ## Error Handling
//!
//! Operations return `RangelockResult<T>` which can contain the following errors:
//!
//! - `RangelockError::RangeAlreadyLocked`: A non-blocking acquire found the range held in an
//!   incompatible mode
//! - `RangelockError::InvalidRange`: The requested range is empty or inverted
//! - `RangelockError::InvalidConfig`: A dataspace configuration was rejected
//!
//! ## Thread Safety
//!
//! Dataspaces and guards implement `Send` and `Sync`. The RAII guard pattern ensures that
//! locks are properly released even in the presence of panics.
//!
//! ## License
//!
//! Licensed under the Apache License, Version 2.0.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod config;
mod dataspace;
mod domain;
mod io;
mod result;
mod segment;
mod span;
mod tree;

pub use self::config::{DataspaceConfig, DEFAULT_WAIT_TIMEOUT};
pub use self::dataspace::{Dataspace, RangeLockGuard};
pub use self::domain::Domain;
pub use self::io::{IoDirection, IoRequest};
pub use self::result::{RangelockError, RangelockResult};
pub use self::segment::{CacheState, LockMode, SegmentInfo};
pub use self::span::{Offset, Span, OFFSET_MAX, OFFSET_MIN};
