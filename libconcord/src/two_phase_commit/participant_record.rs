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

use crate::error::InvalidStateError;
use crate::process::ProcessId;
use crate::transaction_log::{LogEntry, LogPayload};

use super::Decision;
use super::ParticipantState;
use super::PreparedPayload;
use super::TransactionId;
use super::TwoPhaseCommitState;
use super::Vote;

/// A participant's durable view of one transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantLocalRecord {
    transaction_id: TransactionId,
    coordinator: Option<ProcessId>,
    state: ParticipantState,
    vote: Option<Vote>,
    prepared_payload: Option<PreparedPayload>,
}

impl ParticipantLocalRecord {
    pub(crate) fn idle(transaction_id: TransactionId, coordinator: Option<ProcessId>) -> Self {
        ParticipantLocalRecord {
            transaction_id,
            coordinator,
            state: ParticipantState::Idle,
            vote: None,
            prepared_payload: None,
        }
    }

    /// Rebuilds a record from the entries one participant wrote for a transaction, in log order.
    ///
    /// Returns `Ok(None)` if there are no entries, meaning the participant has no record of the
    /// transaction at all.
    pub fn replay(entries: &[LogEntry]) -> Result<Option<Self>, InvalidStateError> {
        let first = match entries.first() {
            Some(first) => first,
            None => return Ok(None),
        };

        let coordinator = match first.payload() {
            LogPayload::Prepared { coordinator, .. } | LogPayload::Voted { coordinator, .. } => {
                Some(coordinator.clone())
            }
            // An ABORT that arrived before any PREPARE.
            LogPayload::Resolved {
                decision: Decision::Abort,
            } => None,
            other => {
                return Err(InvalidStateError::with_message(format!(
                    "participant history for transaction {} starts with {:?}",
                    first.transaction_id(),
                    other
                )))
            }
        };

        let mut record = ParticipantLocalRecord::idle(*first.transaction_id(), coordinator);
        for entry in entries {
            record.apply(entry)?;
        }

        Ok(Some(record))
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// The coordinator that sent PREPARE; queried for the decision during recovery.
    ///
    /// `None` if the transaction was aborted before this participant saw PREPARE.
    pub fn coordinator(&self) -> Option<&ProcessId> {
        self.coordinator.as_ref()
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    pub fn vote(&self) -> Option<Vote> {
        self.vote
    }

    pub fn prepared_payload(&self) -> Option<&PreparedPayload> {
        self.prepared_payload.as_ref()
    }

    /// Validates and applies `entry`.
    pub(crate) fn apply(&mut self, entry: &LogEntry) -> Result<(), InvalidStateError> {
        if *entry.transaction_id() != self.transaction_id
            || entry.from_state() != Some(TwoPhaseCommitState::from(self.state))
        {
            return Err(InvalidStateError::with_message(format!(
                "entry {:?} -> {:?} for transaction {} does not follow {:?}",
                entry.from_state(),
                entry.to_state(),
                entry.transaction_id(),
                self.state
            )));
        }

        let next = ParticipantState::try_from(entry.to_state())?;
        if !self.state.can_transition_to(next) {
            return Err(InvalidStateError::with_message(format!(
                "participant can not move transaction {} from {:?} to {:?}",
                self.transaction_id, self.state, next
            )));
        }

        match (entry.payload(), next) {
            (LogPayload::Prepared { payload, .. }, ParticipantState::Prepared) => {
                self.vote = Some(Vote::Yes);
                self.prepared_payload = Some(payload.clone());
            }
            (LogPayload::Voted { vote: Vote::No, .. }, ParticipantState::Aborted) => {
                self.vote = Some(Vote::No);
            }
            (LogPayload::Resolved { decision }, next)
                if next == ParticipantState::resolved(*decision) => {}
            (payload, next) => {
                return Err(InvalidStateError::with_message(format!(
                    "payload {:?} does not lead to {:?}",
                    payload, next
                )))
            }
        }

        self.state = next;
        Ok(())
    }

    /// Whether applying `decision` now would be a no-op repeat of what already happened.
    pub(crate) fn has_applied(&self, decision: Decision) -> bool {
        self.state == ParticipantState::resolved(decision)
    }
}
