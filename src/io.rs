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

//! Locking from read and write descriptors.

use crate::segment::LockMode;
use crate::span::{Offset, Span};

/// The direction of an I/O request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoDirection {
    /// Data flows out of the dataspace.
    Read,
    /// Data flows into the dataspace.
    Write,
}

/// A read or write of `length` bytes at `offset`.
///
/// # Examples
///
/// ```rust
/// use spanlock::{IoRequest, LockMode, Span};
///
/// let io = IoRequest::write(4096, 512);
/// assert_eq!(io.span(), Span::new(4096, 4607));
/// assert_eq!(io.mode(), LockMode::Modifying);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoRequest {
    /// First byte touched by the request.
    pub offset: Offset,
    /// Number of bytes touched by the request.
    pub length: u64,
    /// Whether the request reads or writes.
    pub direction: IoDirection,
}

impl IoRequest {
    /// Describes a read of `length` bytes at `offset`.
    pub fn read(offset: Offset, length: u64) -> Self {
        IoRequest {
            offset,
            length,
            direction: IoDirection::Read,
        }
    }

    /// Describes a write of `length` bytes at `offset`.
    pub fn write(offset: Offset, length: u64) -> Self {
        IoRequest {
            offset,
            length,
            direction: IoDirection::Write,
        }
    }

    /// The byte range the request touches, clamped at the end of the domain.
    pub fn span(&self) -> Span {
        Span::from_length(self.offset, self.length)
    }

    /// Reads share the range; writes modify it.
    pub fn mode(&self) -> LockMode {
        match self.direction {
            IoDirection::Read => LockMode::Shared,
            IoDirection::Write => LockMode::Modifying,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::OFFSET_MAX;

    #[test]
    fn test_read_is_shared() {
        let io = IoRequest::read(0, 100);
        assert_eq!(io.span(), Span::new(0, 99));
        assert_eq!(io.mode(), LockMode::Shared);
    }

    #[test]
    fn test_write_is_modifying() {
        let io = IoRequest::write(-8, 8);
        assert_eq!(io.span(), Span::new(-8, -1));
        assert_eq!(io.mode(), LockMode::Modifying);
    }

    #[test]
    fn test_seek_overflow_clamps() {
        let io = IoRequest::read(OFFSET_MAX - 10, 1 << 40);
        assert_eq!(io.span(), Span::new(OFFSET_MAX - 10, OFFSET_MAX));
    }

    #[test]
    fn test_empty_request_extends_to_end() {
        let io = IoRequest::write(500, 0);
        assert_eq!(io.span(), Span::new(500, OFFSET_MAX));
    }
}
