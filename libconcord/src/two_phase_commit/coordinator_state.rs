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

/// The coordinator-side state of a transaction.
///
/// Transitions are `Init -> Preparing -> {Committing | Aborting} -> Done`; no state is skipped and
/// `Done` is terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorState {
    Init,
    Preparing,
    Committing,
    Aborting,
    Done,
}

impl CoordinatorState {
    pub fn can_transition_to(&self, next: CoordinatorState) -> bool {
        matches!(
            (self, next),
            (CoordinatorState::Init, CoordinatorState::Preparing)
                | (CoordinatorState::Preparing, CoordinatorState::Committing)
                | (CoordinatorState::Preparing, CoordinatorState::Aborting)
                | (CoordinatorState::Committing, CoordinatorState::Done)
                | (CoordinatorState::Aborting, CoordinatorState::Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Done)
    }

    /// The state entered when `decision` is made.
    pub fn deciding(decision: Decision) -> Self {
        match decision {
            Decision::Commit => CoordinatorState::Committing,
            Decision::Abort => CoordinatorState::Aborting,
        }
    }
}
