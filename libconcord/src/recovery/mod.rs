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

//! Crash recovery for coordinators and participants.
//!
//! Recovery rebuilds in-memory state purely from the [`TransactionLog`] and then finishes what
//! the log shows was left unfinished. It must run before a restarted node accepts new work.
//!
//! [`TransactionLog`]: crate::transaction_log::TransactionLog

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{CommitError, InvalidStateError, RecoveryError};
use crate::links::Transport;
use crate::transaction_log::LogEntry;
use crate::two_phase_commit::{
    Coordinator, Decision, Participant, ParticipantLocalRecord, Transaction, TransactionId,
};

/// What [`RecoveryManager::recover_coordinator`] did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CoordinatorRecoveryReport {
    decided: Vec<TransactionId>,
    redelivered: Vec<TransactionId>,
    completed: Vec<TransactionId>,
    undelivered: Vec<TransactionId>,
}

impl CoordinatorRecoveryReport {
    /// Transactions that had no logged decision and were decided during recovery.
    pub fn decided(&self) -> &[TransactionId] {
        &self.decided
    }

    /// Transactions whose logged decision was sent again.
    pub fn redelivered(&self) -> &[TransactionId] {
        &self.redelivered
    }

    /// Transactions that reached DONE.
    pub fn completed(&self) -> &[TransactionId] {
        &self.completed
    }

    /// Transactions still missing acknowledgements; a later recovery run resends them.
    pub fn undelivered(&self) -> &[TransactionId] {
        &self.undelivered
    }
}

/// What [`RecoveryManager::recover_participant`] did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParticipantRecoveryReport {
    resolved: Vec<(TransactionId, Decision)>,
    blocked: Vec<TransactionId>,
}

impl ParticipantRecoveryReport {
    pub fn resolved(&self) -> &[(TransactionId, Decision)] {
        &self.resolved
    }

    /// Prepared transactions whose decision could not be learned. They hold their resources
    /// until a decision is delivered or a later recovery run learns it.
    pub fn blocked(&self) -> &[TransactionId] {
        &self.blocked
    }
}

/// Resumes in-flight transactions after a restart.
pub struct RecoveryManager {
    transport: Arc<dyn Transport>,
}

impl RecoveryManager {
    /// `transport` is used by participants to ask their coordinator for decisions.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        RecoveryManager { transport }
    }

    /// Finishes every transaction the coordinator's log shows as incomplete.
    ///
    /// All transactions are replayed before any is resumed, so a corrupt history stops recovery
    /// before anything is sent. A transaction left in INIT is moved to PREPARING; an undecided
    /// one has its missing votes collected and is decided; a decided one has its decision resent
    /// to the participants that have not acknowledged it.
    ///
    /// # Errors
    ///
    /// Returns a [`RecoveryError`] if the log cannot be read, describes an impossible history, or
    /// a recovered step can not be logged. The coordinator must not accept new transactions in
    /// that case.
    pub fn recover_coordinator(
        &self,
        coordinator: &Coordinator,
    ) -> Result<CoordinatorRecoveryReport, RecoveryError> {
        let entries = coordinator.log().scan_incomplete(coordinator.id())?;

        let transactions = group_by_transaction(entries)
            .into_iter()
            .map(|entries| Transaction::replay(&entries))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Coordinator {} recovering {} incomplete transactions",
            coordinator.id(),
            transactions.len()
        );

        let mut report = CoordinatorRecoveryReport::default();
        for transaction in transactions {
            let transaction_id = *transaction.id();
            let was_decided = transaction.decision().is_some();
            let transaction = coordinator.restore(transaction);

            let outcome = coordinator.resume(&transaction)?;

            if was_decided {
                report.redelivered.push(transaction_id);
            } else {
                report.decided.push(transaction_id);
            }

            if outcome.fully_acknowledged() {
                report.completed.push(transaction_id);
            } else {
                report.undelivered.push(transaction_id);
            }
        }

        info!(
            "Coordinator {} recovery finished: {} completed, {} undelivered",
            coordinator.id(),
            report.completed.len(),
            report.undelivered.len()
        );

        Ok(report)
    }

    /// Reloads the participant's prepared transactions and asks their coordinators for the
    /// decision.
    ///
    /// Resources of every prepared transaction are restored through the resource manager before
    /// any decision is applied. A transaction whose coordinator is unreachable or undecided stays
    /// prepared and is reported as blocked; it is never resolved unilaterally. Recovery can be run
    /// again at any time to retry blocked transactions.
    ///
    /// # Errors
    ///
    /// Returns a [`RecoveryError`] if the log cannot be read or written, describes an impossible
    /// history, or the resource manager can not restore a prepared transaction.
    pub fn recover_participant(
        &self,
        participant: &Participant,
    ) -> Result<ParticipantRecoveryReport, RecoveryError> {
        let entries = participant.log().scan_incomplete(participant.id())?;

        let mut records = Vec::new();
        for entries in group_by_transaction(entries) {
            if let Some(record) = ParticipantLocalRecord::replay(&entries)? {
                records.push(record);
            }
        }

        info!(
            "Participant {} recovering {} prepared transactions",
            participant.id(),
            records.len()
        );

        for record in &records {
            participant.restore(record.clone())?;
        }

        let mut report = ParticipantRecoveryReport::default();
        for record in records {
            let transaction_id = *record.transaction_id();
            let coordinator = record.coordinator().ok_or_else(|| {
                InvalidStateError::with_message(format!(
                    "prepared transaction {} has no coordinator",
                    transaction_id
                ))
            })?;

            match self.transport.query_decision(coordinator, &transaction_id) {
                Ok(Some(decision)) => match participant.handle_decision(&transaction_id, decision) {
                    Ok(()) => report.resolved.push((transaction_id, decision)),
                    Err(CommitError::Log(err)) => return Err(RecoveryError::Log(err)),
                    Err(err) => {
                        warn!(
                            "Unable to apply {} to transaction {} on {}: {}",
                            decision,
                            transaction_id,
                            participant.id(),
                            err
                        );
                        report.blocked.push(transaction_id);
                    }
                },
                Ok(None) => {
                    warn!(
                        "Transaction {} is undecided by {}, {} stays prepared",
                        transaction_id,
                        coordinator,
                        participant.id()
                    );
                    report.blocked.push(transaction_id);
                }
                Err(err) => {
                    warn!(
                        "Unable to learn the decision on transaction {} from {}, {} stays \
                        prepared: {}",
                        transaction_id,
                        coordinator,
                        participant.id(),
                        err
                    );
                    report.blocked.push(transaction_id);
                }
            }
        }

        Ok(report)
    }
}

// Splits an ordered scan into per-transaction histories, in order of first appearance.
fn group_by_transaction(entries: Vec<LogEntry>) -> Vec<Vec<LogEntry>> {
    let mut positions: HashMap<TransactionId, usize> = HashMap::new();
    let mut groups: Vec<Vec<LogEntry>> = Vec::new();

    for entry in entries {
        let position = *positions
            .entry(*entry.transaction_id())
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[position].push(entry);
    }

    groups
}
