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

//! Error types and results for the spanlock library.

use crate::span::{Offset, Span};
use thiserror::Error;

/// A specialized Result type for spanlock operations.
pub type RangelockResult<T> = Result<T, RangelockError>;

/// Errors that can occur during spanlock operations.
///
/// The blocking acquire path never fails; these errors come from the non-blocking acquire, from
/// range conversion, and from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangelockError {
    /// Part of the requested range is held in an incompatible mode.
    #[error("range {0} is already locked")]
    RangeAlreadyLocked(Span),
    /// The requested range has no offsets in it.
    #[error("invalid range: begin {begin} is past end {end}")]
    InvalidRange {
        /// First offset of the rejected range.
        begin: Offset,
        /// Last offset of the rejected range.
        end: Offset,
    },
    /// A dataspace configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
