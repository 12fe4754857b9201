// Copyright 2021-2022 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use crate::error::InvalidStateError;

// The default time to wait for every vote when recovery re-runs a prepare phase.
const PREPARE_TIMEOUT_SECONDS: u64 = 30;

// The default time to wait for decision acknowledgements in each delivery round. A missing ack
// only delays completion; the decision is resent in the next round or by recovery.
const ACK_TIMEOUT_SECONDS: u64 = 5;

const DELIVERY_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF_MILLIS: u64 = 50;
const MAX_BACKOFF_MILLIS: u64 = 2_000;

/// Bounded exponential backoff for decision delivery.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// The pause after the `retry`-th failed round, counting from zero.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map(|backoff| backoff.min(self.max_backoff))
            .unwrap_or(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DELIVERY_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MILLIS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MILLIS),
        }
    }
}

/// Tunables for a [`Coordinator`](super::Coordinator).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoordinatorConfig {
    prepare_timeout: Duration,
    ack_timeout: Duration,
    retry: RetryPolicy,
}

impl CoordinatorConfig {
    pub fn prepare_timeout(&self) -> Duration {
        self.prepare_timeout
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            prepare_timeout: Duration::from_secs(PREPARE_TIMEOUT_SECONDS),
            ack_timeout: Duration::from_secs(ACK_TIMEOUT_SECONDS),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Default)]
pub struct CoordinatorConfigBuilder {
    prepare_timeout: Option<Duration>,
    ack_timeout: Option<Duration>,
    max_attempts: Option<u32>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
}

impl CoordinatorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prepare_timeout(mut self, timeout: Duration) -> Self {
        self.prepare_timeout = Some(timeout);
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    pub fn build(self) -> Result<CoordinatorConfig, InvalidStateError> {
        let defaults = CoordinatorConfig::default();

        let prepare_timeout = self.prepare_timeout.unwrap_or(defaults.prepare_timeout);
        let ack_timeout = self.ack_timeout.unwrap_or(defaults.ack_timeout);
        let max_attempts = self.max_attempts.unwrap_or(defaults.retry.max_attempts);
        let initial_backoff = self
            .initial_backoff
            .unwrap_or(defaults.retry.initial_backoff);
        let max_backoff = self.max_backoff.unwrap_or(defaults.retry.max_backoff);

        if prepare_timeout.is_zero() {
            return Err(InvalidStateError::with_message(
                "prepare_timeout must be greater than zero".into(),
            ));
        }

        if ack_timeout.is_zero() {
            return Err(InvalidStateError::with_message(
                "ack_timeout must be greater than zero".into(),
            ));
        }

        if max_attempts == 0 {
            return Err(InvalidStateError::with_message(
                "at least one delivery attempt is required".into(),
            ));
        }

        if initial_backoff > max_backoff {
            return Err(InvalidStateError::with_message(format!(
                "initial_backoff {:?} exceeds max_backoff {:?}",
                initial_backoff, max_backoff
            )));
        }

        Ok(CoordinatorConfig {
            prepare_timeout,
            ack_timeout,
            retry: RetryPolicy {
                max_attempts,
                initial_backoff,
                max_backoff,
            },
        })
    }
}
