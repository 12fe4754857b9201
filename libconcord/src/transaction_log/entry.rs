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

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::process::ProcessId;
use crate::two_phase_commit::{
    Decision, Operation, PreparedPayload, TransactionId, TwoPhaseCommitState, Vote,
};

/// Data attached to a state transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPayload {
    None,

    /// Written by the coordinator when a transaction is created.
    Begin {
        participants: Vec<ProcessId>,
        operations: BTreeMap<ProcessId, Vec<Operation>>,
        deadline: SystemTime,
    },

    /// A vote received by the coordinator.
    Vote { participant: ProcessId, vote: Vote },

    /// The coordinator's decision.
    Decision { decision: Decision },

    /// A participant acknowledged the decision.
    Acknowledged { participant: ProcessId },

    /// Written by a participant that voted YES; `payload` is what it needs to finish.
    Prepared {
        coordinator: ProcessId,
        payload: PreparedPayload,
    },

    /// Written by a participant that voted NO.
    Voted { coordinator: ProcessId, vote: Vote },

    /// Written by a participant that applied a decision.
    Resolved { decision: Decision },
}

/// One immutable record in the transaction log.
///
/// Entries are totally ordered per transaction. The log is the single source of truth after a
/// crash: coordinator and participant state is rebuilt by replaying entries in order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    transaction_id: TransactionId,
    actor: ProcessId,
    from_state: Option<TwoPhaseCommitState>,
    to_state: TwoPhaseCommitState,
    payload: LogPayload,
    timestamp: SystemTime,
}

impl LogEntry {
    pub fn new(
        transaction_id: TransactionId,
        actor: ProcessId,
        from_state: Option<TwoPhaseCommitState>,
        to_state: TwoPhaseCommitState,
        payload: LogPayload,
        timestamp: SystemTime,
    ) -> Self {
        LogEntry {
            transaction_id,
            actor,
            from_state,
            to_state,
            payload,
            timestamp,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn actor(&self) -> &ProcessId {
        &self.actor
    }

    /// The state before this entry; `None` for the first entry an actor writes.
    pub fn from_state(&self) -> Option<TwoPhaseCommitState> {
        self.from_state
    }

    pub fn to_state(&self) -> TwoPhaseCommitState {
        self.to_state
    }

    pub fn payload(&self) -> &LogPayload {
        &self.payload
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}
