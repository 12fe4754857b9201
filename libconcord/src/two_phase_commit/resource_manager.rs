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

use crate::error::InternalError;

use super::Operation;
use super::PreparedPayload;

/// The domain-specific capability a [`Participant`](super::Participant) votes on behalf of.
///
/// Locks on the underlying data are taken in [`prepare`](ResourceManager::prepare) and released
/// only in [`commit`](ResourceManager::commit) or [`abort`](ResourceManager::abort). Between the
/// two the participant may be blocked for an unbounded time if the coordinator is lost.
///
/// `commit` and `abort` may be invoked again with the same payload if the process crashes after
/// applying a decision but before logging it, so they must be idempotent per payload.
pub trait ResourceManager: Send + Sync {
    /// Whether the operations can be applied. Returning `false` produces a NO vote.
    fn can_commit(&self, operations: &[Operation]) -> Result<bool, InternalError>;

    /// Acquires whatever is needed to guarantee a later commit and returns the data required to
    /// finish. An error produces a NO vote.
    fn prepare(&self, operations: &[Operation]) -> Result<PreparedPayload, InternalError>;

    fn commit(&self, payload: &PreparedPayload) -> Result<(), InternalError>;

    fn abort(&self, payload: &PreparedPayload) -> Result<(), InternalError>;

    /// Re-acquires the resources described by `payload` after a restart, before the participant
    /// waits for the decision.
    fn restore(&self, _payload: &PreparedPayload) -> Result<(), InternalError> {
        Ok(())
    }
}
