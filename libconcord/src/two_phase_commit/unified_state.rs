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

use crate::error::InvalidStateError;

use super::CoordinatorState;
use super::ParticipantState;

/// The union of coordinator and participant states, as recorded in the transaction log.
///
/// A single log can hold entries written by both roles; each role converts the recorded state
/// back into its own state type and rejects states that belong to the other role.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TwoPhaseCommitState {
    Init,
    Preparing,
    Committing,
    Aborting,
    Done,
    Idle,
    Prepared,
    Committed,
    Aborted,
}

impl TwoPhaseCommitState {
    /// Whether no further entries will be written for a transaction in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TwoPhaseCommitState::Done
                | TwoPhaseCommitState::Committed
                | TwoPhaseCommitState::Aborted
        )
    }
}

impl TryFrom<TwoPhaseCommitState> for CoordinatorState {
    type Error = InvalidStateError;

    fn try_from(state: TwoPhaseCommitState) -> Result<Self, InvalidStateError> {
        match state {
            TwoPhaseCommitState::Init => Ok(CoordinatorState::Init),
            TwoPhaseCommitState::Preparing => Ok(CoordinatorState::Preparing),
            TwoPhaseCommitState::Committing => Ok(CoordinatorState::Committing),
            TwoPhaseCommitState::Aborting => Ok(CoordinatorState::Aborting),
            TwoPhaseCommitState::Done => Ok(CoordinatorState::Done),
            TwoPhaseCommitState::Idle
            | TwoPhaseCommitState::Prepared
            | TwoPhaseCommitState::Committed
            | TwoPhaseCommitState::Aborted => Err(InvalidStateError::with_message(format!(
                "invalid state for coordinator: {state:?}",
            ))),
        }
    }
}

impl TryFrom<TwoPhaseCommitState> for ParticipantState {
    type Error = InvalidStateError;

    fn try_from(state: TwoPhaseCommitState) -> Result<Self, InvalidStateError> {
        match state {
            TwoPhaseCommitState::Idle => Ok(ParticipantState::Idle),
            TwoPhaseCommitState::Prepared => Ok(ParticipantState::Prepared),
            TwoPhaseCommitState::Committed => Ok(ParticipantState::Committed),
            TwoPhaseCommitState::Aborted => Ok(ParticipantState::Aborted),
            TwoPhaseCommitState::Init
            | TwoPhaseCommitState::Preparing
            | TwoPhaseCommitState::Committing
            | TwoPhaseCommitState::Aborting
            | TwoPhaseCommitState::Done => Err(InvalidStateError::with_message(format!(
                "invalid state for participant: {state:?}",
            ))),
        }
    }
}

impl From<CoordinatorState> for TwoPhaseCommitState {
    fn from(state: CoordinatorState) -> Self {
        match state {
            CoordinatorState::Init => TwoPhaseCommitState::Init,
            CoordinatorState::Preparing => TwoPhaseCommitState::Preparing,
            CoordinatorState::Committing => TwoPhaseCommitState::Committing,
            CoordinatorState::Aborting => TwoPhaseCommitState::Aborting,
            CoordinatorState::Done => TwoPhaseCommitState::Done,
        }
    }
}

impl From<ParticipantState> for TwoPhaseCommitState {
    fn from(state: ParticipantState) -> Self {
        match state {
            ParticipantState::Idle => TwoPhaseCommitState::Idle,
            ParticipantState::Prepared => TwoPhaseCommitState::Prepared,
            ParticipantState::Committed => TwoPhaseCommitState::Committed,
            ParticipantState::Aborted => TwoPhaseCommitState::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_conversions() {
        let state: TwoPhaseCommitState = CoordinatorState::Committing.into();
        assert_eq!(
            CoordinatorState::try_from(state).unwrap(),
            CoordinatorState::Committing
        );
        assert!(ParticipantState::try_from(state).is_err());

        let state: TwoPhaseCommitState = ParticipantState::Prepared.into();
        assert_eq!(
            ParticipantState::try_from(state).unwrap(),
            ParticipantState::Prepared
        );
        assert!(CoordinatorState::try_from(state).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(TwoPhaseCommitState::Done.is_terminal());
        assert!(TwoPhaseCommitState::Committed.is_terminal());
        assert!(TwoPhaseCommitState::Aborted.is_terminal());
        assert!(!TwoPhaseCommitState::Committing.is_terminal());
        assert!(!TwoPhaseCommitState::Prepared.is_terminal());
    }
}
