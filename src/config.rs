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

//! Dataspace configuration.

use crate::result::{RangelockError, RangelockResult};
use std::time::Duration;

/// Default bound on a single wait for a collision segment.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables for a [`Dataspace`](crate::Dataspace).
///
/// # Examples
///
/// ```rust
/// use spanlock::{Dataspace, DataspaceConfig};
/// use std::time::Duration;
///
/// let config = DataspaceConfig::default().with_wait_timeout(Duration::from_millis(100));
/// let dataspace = Dataspace::with_config(config).unwrap();
/// assert_eq!(dataspace.config().wait_timeout(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataspaceConfig {
    wait_timeout: Duration,
}

impl DataspaceConfig {
    /// Sets how long a blocked acquire sleeps before rescanning its range on its own.
    ///
    /// Releases wake blocked callers explicitly; the timeout only bounds the damage of a missed
    /// wakeup. It is not a cancellation mechanism, a blocked acquire keeps retrying.
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// The bound on a single wait.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Checks the configuration for values the dataspace cannot run with.
    pub fn validate(&self) -> RangelockResult<()> {
        if self.wait_timeout.is_zero() {
            return Err(RangelockError::InvalidConfig(
                "wait_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DataspaceConfig {
    fn default() -> Self {
        DataspaceConfig {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DataspaceConfig::default();
        assert_eq!(config.wait_timeout(), DEFAULT_WAIT_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = DataspaceConfig::default().with_wait_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(RangelockError::InvalidConfig(_))
        ));
    }
}
