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

use serde::{Deserialize, Serialize};

use super::Decision;

/// The participant-side state of a transaction.
///
/// Transitions are `Idle -> Prepared -> {Committed | Aborted}`, plus `Idle -> Aborted` when the
/// participant votes NO. `Prepared` is the only state in which the participant holds resources
/// while waiting on someone else.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantState {
    Idle,
    Prepared,
    Committed,
    Aborted,
}

impl ParticipantState {
    pub fn can_transition_to(&self, next: ParticipantState) -> bool {
        matches!(
            (self, next),
            (ParticipantState::Idle, ParticipantState::Prepared)
                | (ParticipantState::Idle, ParticipantState::Aborted)
                | (ParticipantState::Prepared, ParticipantState::Committed)
                | (ParticipantState::Prepared, ParticipantState::Aborted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ParticipantState::Committed | ParticipantState::Aborted)
    }

    /// The terminal state reached by applying `decision`.
    pub fn resolved(decision: Decision) -> Self {
        match decision {
            Decision::Commit => ParticipantState::Committed,
            Decision::Abort => ParticipantState::Aborted,
        }
    }
}
