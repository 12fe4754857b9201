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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::TransportError;
use crate::process::ProcessId;
use crate::two_phase_commit::{
    Coordinator, Decision, DecisionMessage, Participant, PrepareMessage, TransactionId, Vote,
};

use super::Transport;

/// Routes messages to coordinators and participants living in the same process.
///
/// Participants are held strongly. Coordinators are held weakly, since a coordinator in turn
/// holds its transport.
///
/// Faults can be injected per destination: a partitioned process is unreachable until healed,
/// and a delayed process answers only after the delay has passed.
#[derive(Default)]
pub struct LocalTransport {
    participants: RwLock<HashMap<ProcessId, Arc<Participant>>>,
    coordinators: RwLock<HashMap<ProcessId, Weak<Coordinator>>>,
    partitioned: RwLock<HashSet<ProcessId>>,
    delays: RwLock<HashMap<ProcessId, Duration>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `participant` reachable under its own id, replacing any previous registration.
    pub fn register_participant(&self, participant: Arc<Participant>) {
        self.participants
            .write()
            .insert(participant.id().clone(), participant);
    }

    pub fn deregister_participant(&self, id: &ProcessId) -> Option<Arc<Participant>> {
        self.participants.write().remove(id)
    }

    pub fn register_coordinator(&self, coordinator: &Arc<Coordinator>) {
        self.coordinators
            .write()
            .insert(coordinator.id().clone(), Arc::downgrade(coordinator));
    }

    pub fn deregister_coordinator(&self, id: &ProcessId) {
        self.coordinators.write().remove(id);
    }

    /// Cuts `process` off until [`heal`](LocalTransport::heal) is called.
    pub fn partition(&self, process: &ProcessId) {
        self.partitioned.write().insert(process.clone());
    }

    pub fn heal(&self, process: &ProcessId) {
        self.partitioned.write().remove(process);
    }

    /// Delays every message to `process` by `delay`.
    pub fn set_delay(&self, process: &ProcessId, delay: Duration) {
        self.delays.write().insert(process.clone(), delay);
    }

    pub fn clear_delay(&self, process: &ProcessId) {
        self.delays.write().remove(process);
    }

    fn reach(&self, process: &ProcessId) -> Result<(), TransportError> {
        if self.partitioned.read().contains(process) {
            return Err(TransportError::Unreachable(process.clone()));
        }

        let delay = self.delays.read().get(process).copied();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        Ok(())
    }

    fn participant(&self, id: &ProcessId) -> Result<Arc<Participant>, TransportError> {
        self.reach(id)?;
        self.participants
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(id.clone()))
    }

    fn coordinator(&self, id: &ProcessId) -> Result<Arc<Coordinator>, TransportError> {
        self.reach(id)?;
        self.coordinators
            .read()
            .get(id)
            .and_then(Weak::upgrade)
            .ok_or_else(|| TransportError::Unreachable(id.clone()))
    }
}

impl Transport for LocalTransport {
    fn send_prepare(
        &self,
        participant: &ProcessId,
        message: &PrepareMessage,
    ) -> Result<Vote, TransportError> {
        self.participant(participant)?
            .handle_prepare(
                &message.transaction_id,
                &message.coordinator,
                &message.operations,
            )
            .map_err(|err| TransportError::Remote(participant.clone(), err.to_string()))
    }

    fn send_decision(
        &self,
        participant: &ProcessId,
        message: &DecisionMessage,
    ) -> Result<(), TransportError> {
        self.participant(participant)?
            .handle_decision(&message.transaction_id, message.decision)
            .map_err(|err| TransportError::Remote(participant.clone(), err.to_string()))
    }

    fn query_vote(
        &self,
        participant: &ProcessId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Vote>, TransportError> {
        self.participant(participant)?
            .query_vote(transaction_id)
            .map_err(|err| TransportError::Remote(participant.clone(), err.to_string()))
    }

    fn query_decision(
        &self,
        coordinator: &ProcessId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Decision>, TransportError> {
        self.coordinator(coordinator)?
            .query_decision(transaction_id)
            .map_err(|err| TransportError::Remote(coordinator.clone(), err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use crate::transaction_log::MemoryTransactionLog;
    use crate::two_phase_commit::CoordinatorConfig;

    use super::*;

    #[test]
    fn partitioned_and_unknown_processes_are_unreachable() {
        let transport = LocalTransport::new();
        let tx = TransactionId::new();
        let p1 = ProcessId::from("p1");

        assert_eq!(
            transport.query_vote(&p1, &tx),
            Err(TransportError::Unreachable(p1.clone()))
        );

        let coordinator = Arc::new(Coordinator::new(
            "c".into(),
            Arc::new(MemoryTransactionLog::new()),
            Arc::new(LocalTransport::new()),
            CoordinatorConfig::default(),
        ));
        transport.register_coordinator(&coordinator);
        assert_eq!(
            transport.query_decision(&"c".into(), &tx),
            Ok(Some(Decision::Abort))
        );

        transport.partition(&"c".into());
        assert!(transport.query_decision(&"c".into(), &tx).is_err());
        transport.heal(&"c".into());
        assert!(transport.query_decision(&"c".into(), &tx).is_ok());

        drop(coordinator);
        assert_eq!(
            transport.query_decision(&"c".into(), &tx),
            Err(TransportError::Unreachable("c".into()))
        );
    }
}
