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

use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use crate::error::InvalidStateError;
use crate::process::ProcessId;
use crate::transaction_log::{LogEntry, LogPayload};

use super::CoordinatorState;
use super::Decision;
use super::Operation;
use super::TransactionId;
use super::TwoPhaseCommitState;
use super::Vote;

/// The coordinator's view of a distributed transaction.
///
/// A `Transaction` only changes by applying [`LogEntry`] records, which keeps the in-memory copy
/// identical to what replaying the log produces. Two rules are enforced on every entry:
///
/// - votes are monotonic: a recorded vote is never overwritten;
/// - the decision is set once, only from `Preparing`, and only COMMIT when every participant
///   voted YES.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    id: TransactionId,
    participants: BTreeSet<ProcessId>,
    operations: BTreeMap<ProcessId, Vec<Operation>>,
    state: CoordinatorState,
    votes: BTreeMap<ProcessId, Vote>,
    decision: Option<Decision>,
    acknowledged: BTreeSet<ProcessId>,
    created_at: SystemTime,
    deadline: SystemTime,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        participants: BTreeSet<ProcessId>,
        operations: BTreeMap<ProcessId, Vec<Operation>>,
        created_at: SystemTime,
        deadline: SystemTime,
    ) -> Self {
        Transaction {
            id,
            participants,
            operations,
            state: CoordinatorState::Init,
            votes: BTreeMap::new(),
            decision: None,
            acknowledged: BTreeSet::new(),
            created_at,
            deadline,
        }
    }

    /// Rebuilds a transaction from the entries one coordinator wrote for it, in log order.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidStateError`] if the entries do not start with the transaction's
    /// `Begin` record or describe a transition the protocol does not allow.
    pub fn replay(entries: &[LogEntry]) -> Result<Self, InvalidStateError> {
        let (first, rest) = entries.split_first().ok_or_else(|| {
            InvalidStateError::with_message("no log entries to replay".into())
        })?;

        let mut transaction = match (first.from_state(), first.to_state(), first.payload()) {
            (
                None,
                TwoPhaseCommitState::Init,
                LogPayload::Begin {
                    participants,
                    operations,
                    deadline,
                },
            ) => Transaction::new(
                *first.transaction_id(),
                participants.iter().cloned().collect(),
                operations.clone(),
                first.timestamp(),
                *deadline,
            ),
            _ => {
                return Err(InvalidStateError::with_message(format!(
                    "transaction {} does not start with a begin entry",
                    first.transaction_id()
                )))
            }
        };

        for entry in rest {
            transaction.apply(entry)?;
        }

        Ok(transaction)
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn participants(&self) -> &BTreeSet<ProcessId> {
        &self.participants
    }

    pub fn operations(&self) -> &BTreeMap<ProcessId, Vec<Operation>> {
        &self.operations
    }

    /// The operations addressed to `participant`; empty if it has none.
    pub fn operations_for(&self, participant: &ProcessId) -> &[Operation] {
        self.operations
            .get(participant)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn votes(&self) -> &BTreeMap<ProcessId, Vote> {
        &self.votes
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    pub fn acknowledged(&self) -> &BTreeSet<ProcessId> {
        &self.acknowledged
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn deadline(&self) -> SystemTime {
        self.deadline
    }

    /// Participants whose vote has not been recorded.
    pub fn pending_votes(&self) -> Vec<ProcessId> {
        self.participants
            .iter()
            .filter(|p| !self.votes.contains_key(*p))
            .cloned()
            .collect()
    }

    /// Participants that have not acknowledged the decision.
    pub fn unacknowledged(&self) -> Vec<ProcessId> {
        self.participants
            .iter()
            .filter(|p| !self.acknowledged.contains(*p))
            .cloned()
            .collect()
    }

    /// The decision the recorded votes already determine, if any.
    pub fn tally(&self) -> Option<Decision> {
        Decision::from_votes(self.votes.values(), self.participants.len())
    }

    /// Validates `entry` against the current state without changing anything.
    ///
    /// Returns `Ok(false)` if the entry repeats something already recorded, such as a duplicate
    /// vote or acknowledgement.
    pub(crate) fn check(&self, entry: &LogEntry) -> Result<bool, InvalidStateError> {
        if *entry.transaction_id() != self.id {
            return Err(InvalidStateError::with_message(format!(
                "entry for transaction {} applied to transaction {}",
                entry.transaction_id(),
                self.id
            )));
        }

        if entry.from_state() != Some(TwoPhaseCommitState::from(self.state)) {
            return Err(InvalidStateError::with_message(format!(
                "transaction {} is {:?}, entry expects {:?}",
                self.id,
                self.state,
                entry.from_state()
            )));
        }

        let next = CoordinatorState::try_from(entry.to_state())?;

        match entry.payload() {
            LogPayload::Vote { participant, vote } => {
                if self.state != CoordinatorState::Preparing || next != self.state {
                    return Err(InvalidStateError::with_message(format!(
                        "vote for transaction {} outside of the prepare phase",
                        self.id
                    )));
                }
                self.check_participant(participant)?;
                match self.votes.get(participant) {
                    Some(recorded) if recorded == vote => Ok(false),
                    Some(recorded) => Err(InvalidStateError::with_message(format!(
                        "{} already voted {:?} on transaction {}, can not change to {:?}",
                        participant, recorded, self.id, vote
                    ))),
                    None => Ok(true),
                }
            }
            LogPayload::Decision { decision } => {
                if let Some(decided) = self.decision {
                    return Err(InvalidStateError::with_message(format!(
                        "transaction {} already decided {}",
                        self.id, decided
                    )));
                }
                if !self.state.can_transition_to(next)
                    || next != CoordinatorState::deciding(*decision)
                {
                    return Err(InvalidStateError::with_message(format!(
                        "decision {} for transaction {} can not move {:?} to {:?}",
                        decision, self.id, self.state, next
                    )));
                }
                if *decision == Decision::Commit && self.tally() != Some(Decision::Commit) {
                    return Err(InvalidStateError::with_message(format!(
                        "transaction {} can not commit without a YES vote from every \
                        participant",
                        self.id
                    )));
                }
                Ok(true)
            }
            LogPayload::Acknowledged { participant } => {
                if self.decision.is_none() || self.state.is_terminal() || next != self.state {
                    return Err(InvalidStateError::with_message(format!(
                        "acknowledgement for transaction {} outside of the decision phase",
                        self.id
                    )));
                }
                self.check_participant(participant)?;
                Ok(!self.acknowledged.contains(participant))
            }
            LogPayload::None => {
                if !self.state.can_transition_to(next)
                    || matches!(
                        next,
                        CoordinatorState::Committing | CoordinatorState::Aborting
                    )
                {
                    return Err(InvalidStateError::with_message(format!(
                        "transaction {} can not move from {:?} to {:?}",
                        self.id, self.state, next
                    )));
                }
                if next == CoordinatorState::Done && self.acknowledged.len() != self.participants.len()
                {
                    return Err(InvalidStateError::with_message(format!(
                        "transaction {} is not acknowledged by every participant",
                        self.id
                    )));
                }
                Ok(true)
            }
            other => Err(InvalidStateError::with_message(format!(
                "unexpected coordinator log payload {:?}",
                other
            ))),
        }
    }

    /// Validates and applies `entry`. Returns `Ok(false)` if it was a duplicate.
    pub(crate) fn apply(&mut self, entry: &LogEntry) -> Result<bool, InvalidStateError> {
        if !self.check(entry)? {
            return Ok(false);
        }

        let next = CoordinatorState::try_from(entry.to_state())?;
        match entry.payload() {
            LogPayload::Vote { participant, vote } => {
                self.votes.insert(participant.clone(), *vote);
            }
            LogPayload::Decision { decision } => {
                self.decision = Some(*decision);
                self.state = next;
            }
            LogPayload::Acknowledged { participant } => {
                self.acknowledged.insert(participant.clone());
            }
            _ => self.state = next,
        }

        Ok(true)
    }

    fn check_participant(&self, participant: &ProcessId) -> Result<(), InvalidStateError> {
        if self.participants.contains(participant) {
            Ok(())
        } else {
            Err(InvalidStateError::with_message(format!(
                "{} is not a participant of transaction {}",
                participant, self.id
            )))
        }
    }
}
