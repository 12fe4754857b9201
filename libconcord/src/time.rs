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

use std::time::{Duration, SystemTime};

/// Source of the wall-clock timestamps written to the transaction log.
///
/// Deadlines and log timestamps are taken from a `TimeSource` so that tests can pin the clock.
/// Waiting itself always uses the monotonic clock.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Time left until `deadline`, or zero if it has passed.
    fn remaining(&self, deadline: SystemTime) -> Duration {
        deadline
            .duration_since(self.now())
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Default, Clone)]
pub struct SystemTimeFactory {}

impl SystemTimeFactory {
    pub fn new() -> Self {
        SystemTimeFactory {}
    }
}

impl TimeSource for SystemTimeFactory {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
