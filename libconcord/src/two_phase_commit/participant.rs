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

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{CommitError, InvalidStateError};
use crate::process::ProcessId;
use crate::time::{SystemTimeFactory, TimeSource};
use crate::transaction_log::{LogEntry, LogPayload, TransactionLog};

use super::Decision;
use super::Operation;
use super::ParticipantLocalRecord;
use super::ParticipantState;
use super::PreparedPayload;
use super::ResourceManager;
use super::TransactionId;
use super::Vote;

/// Votes on transactions for a local [`ResourceManager`] and enacts the coordinator's decision.
///
/// Messages for the same transaction are handled one at a time; messages for different
/// transactions proceed concurrently. A YES vote is a durable promise: once PREPARED is logged
/// the participant waits for the decision for as long as it takes and never resolves on its own.
pub struct Participant {
    id: ProcessId,
    log: Arc<dyn TransactionLog>,
    resource_manager: Arc<dyn ResourceManager>,
    time_source: Box<dyn TimeSource>,
    records: Mutex<HashMap<TransactionId, ParticipantLocalRecord>>,
    locks: Mutex<HashMap<TransactionId, Arc<Mutex<()>>>>,
}

impl Participant {
    pub fn new(
        id: ProcessId,
        log: Arc<dyn TransactionLog>,
        resource_manager: Arc<dyn ResourceManager>,
    ) -> Self {
        Participant {
            id,
            log,
            resource_manager,
            time_source: Box::new(SystemTimeFactory::new()),
            records: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub(crate) fn log(&self) -> &dyn TransactionLog {
        self.log.as_ref()
    }

    /// Votes on a transaction.
    ///
    /// A repeated PREPARE is answered with the vote already logged; the resource manager is not
    /// consulted again. A PREPARE for a transaction already aborted here is answered NO.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Log`] if the vote could not be logged. In that case no vote has
    /// been cast and any prepared resources have been released.
    pub fn handle_prepare(
        &self,
        transaction_id: &TransactionId,
        coordinator: &ProcessId,
        operations: &[Operation],
    ) -> Result<Vote, CommitError> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock();

        if let Some(record) = self.lookup(transaction_id)? {
            let vote = record.vote().unwrap_or(Vote::No);
            debug!(
                "{} answering repeated or late PREPARE on transaction {} with {:?}",
                self.id, transaction_id, vote
            );
            return Ok(vote);
        }

        let mut record = ParticipantLocalRecord::idle(*transaction_id, Some(coordinator.clone()));

        let payload = match self.resource_manager.can_commit(operations) {
            Ok(true) => match self.resource_manager.prepare(operations) {
                Ok(payload) => Some(payload),
                Err(err) => {
                    warn!(
                        "Unable to prepare transaction {} on {}: {}",
                        transaction_id, self.id, err
                    );
                    None
                }
            },
            Ok(false) => None,
            Err(err) => {
                warn!(
                    "Unable to check transaction {} on {}: {}",
                    transaction_id, self.id, err
                );
                None
            }
        };

        let vote = match payload {
            Some(payload) => {
                let entry = self.entry(
                    &record,
                    ParticipantState::Prepared,
                    LogPayload::Prepared {
                        coordinator: coordinator.clone(),
                        payload: payload.clone(),
                    },
                );

                if let Err(err) = self.log.append(entry.clone()) {
                    error!(
                        "Unable to log PREPARED for transaction {} on {}: {}",
                        transaction_id, self.id, err
                    );
                    self.release(transaction_id, &payload);
                    return Err(err.into());
                }

                record.apply(&entry)?;
                Vote::Yes
            }
            None => {
                let entry = self.entry(
                    &record,
                    ParticipantState::Aborted,
                    LogPayload::Voted {
                        coordinator: coordinator.clone(),
                        vote: Vote::No,
                    },
                );

                self.log.append(entry.clone()).map_err(|err| {
                    error!(
                        "Unable to log NO vote for transaction {} on {}: {}",
                        transaction_id, self.id, err
                    );
                    err
                })?;

                record.apply(&entry)?;
                Vote::No
            }
        };

        self.records.lock().insert(*transaction_id, record);
        info!("{} voted {:?} on transaction {}", self.id, vote, transaction_id);

        Ok(vote)
    }

    /// Applies the coordinator's decision.
    ///
    /// Delivering the same decision again is acknowledged without doing anything. An ABORT for a
    /// transaction this participant has not seen yet is logged, so a PREPARE still in flight is
    /// answered NO instead of holding resources for a finished transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::InvalidState`] if `decision` contradicts the outcome already
    /// reached, [`CommitError::Internal`] if the resource manager fails, and
    /// [`CommitError::Log`] if the outcome could not be logged. After an error the decision may
    /// be delivered again.
    pub fn handle_decision(
        &self,
        transaction_id: &TransactionId,
        decision: Decision,
    ) -> Result<(), CommitError> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock();

        let mut record = match self.lookup(transaction_id)? {
            Some(record) => record,
            None if decision == Decision::Abort => {
                return self.record_early_abort(transaction_id);
            }
            None => {
                warn!(
                    "{} has no record of transaction {}, acknowledging {}",
                    self.id, transaction_id, decision
                );
                self.release_lock(transaction_id, &lock);
                return Ok(());
            }
        };

        if record.has_applied(decision) {
            debug!(
                "{} already applied {} to transaction {}",
                self.id, decision, transaction_id
            );
            return Ok(());
        }

        if record.state() != ParticipantState::Prepared {
            return Err(InvalidStateError::with_message(format!(
                "transaction {} is {:?} on {}, can not apply {}",
                transaction_id,
                record.state(),
                self.id,
                decision
            ))
            .into());
        }

        let payload = record.prepared_payload().cloned().ok_or_else(|| {
            InvalidStateError::with_message(format!(
                "transaction {} is prepared without a payload",
                transaction_id
            ))
        })?;

        match decision {
            Decision::Commit => self.resource_manager.commit(&payload)?,
            Decision::Abort => self.resource_manager.abort(&payload)?,
        }

        let entry = self.entry(
            &record,
            ParticipantState::resolved(decision),
            LogPayload::Resolved { decision },
        );
        self.log.append(entry.clone()).map_err(|err| {
            error!(
                "Unable to log {} of transaction {} on {}: {}",
                decision, transaction_id, self.id, err
            );
            err
        })?;
        record.apply(&entry)?;

        self.records.lock().insert(*transaction_id, record);
        info!("{} applied {} to transaction {}", self.id, decision, transaction_id);

        Ok(())
    }

    /// The vote this participant logged for a transaction, if any. Never changes anything.
    pub fn query_vote(&self, transaction_id: &TransactionId) -> Result<Option<Vote>, CommitError> {
        Ok(self.lookup(transaction_id)?.and_then(|record| record.vote()))
    }

    pub fn state(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<ParticipantState>, CommitError> {
        Ok(self.lookup(transaction_id)?.map(|record| record.state()))
    }

    pub fn record(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<ParticipantLocalRecord>, CommitError> {
        self.lookup(transaction_id)
    }

    /// Transactions this participant voted YES on and is still waiting to hear about.
    pub fn blocked(&self) -> Vec<TransactionId> {
        let mut blocked: Vec<TransactionId> = self
            .records
            .lock()
            .values()
            .filter(|record| record.state() == ParticipantState::Prepared)
            .map(|record| *record.transaction_id())
            .collect();
        blocked.sort();
        blocked
    }

    /// Drops a resolved transaction from memory. Returns `false` if it was not cached.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::InvalidState`] if the transaction is still prepared.
    pub fn forget(&self, transaction_id: &TransactionId) -> Result<bool, CommitError> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock();

        let state = match self.records.lock().get(transaction_id) {
            Some(record) => record.state(),
            None => {
                self.release_lock(transaction_id, &lock);
                return Ok(false);
            }
        };

        if !state.is_terminal() {
            return Err(InvalidStateError::with_message(format!(
                "transaction {} is {:?} on {} and can not be forgotten",
                transaction_id, state, self.id
            ))
            .into());
        }

        self.records.lock().remove(transaction_id);
        self.release_lock(transaction_id, &lock);
        Ok(true)
    }

    /// Caches a replayed record, re-acquiring its resources if it is prepared.
    ///
    /// Returns `false` if the transaction was already cached, in which case nothing is done.
    pub(crate) fn restore(&self, record: ParticipantLocalRecord) -> Result<bool, CommitError> {
        let transaction_id = *record.transaction_id();
        let lock = self.lock_for(&transaction_id);
        let _guard = lock.lock();

        if self.records.lock().contains_key(&transaction_id) {
            return Ok(false);
        }

        if record.state() == ParticipantState::Prepared {
            if let Some(payload) = record.prepared_payload() {
                self.resource_manager.restore(payload)?;
            }
        }

        self.records.lock().insert(transaction_id, record);
        Ok(true)
    }

    fn lock_for(&self, transaction_id: &TransactionId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(*transaction_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    // Drops the lock entry unless another caller is holding or waiting on it. Callers clone the
    // entry under the map lock, so the count can not grow while it is checked.
    fn release_lock(&self, transaction_id: &TransactionId, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(lock) == 2 {
            locks.remove(transaction_id);
        }
    }

    // Logs IDLE -> ABORTED for a transaction aborted before its PREPARE arrived. The caller holds
    // the transaction's lock.
    fn record_early_abort(&self, transaction_id: &TransactionId) -> Result<(), CommitError> {
        let mut record = ParticipantLocalRecord::idle(*transaction_id, None);
        let entry = self.entry(
            &record,
            ParticipantState::Aborted,
            LogPayload::Resolved {
                decision: Decision::Abort,
            },
        );

        self.log.append(entry.clone()).map_err(|err| {
            error!(
                "Unable to log early ABORT of transaction {} on {}: {}",
                transaction_id, self.id, err
            );
            err
        })?;
        record.apply(&entry)?;

        self.records.lock().insert(*transaction_id, record);
        info!(
            "{} recorded ABORT of transaction {} before its PREPARE",
            self.id, transaction_id
        );

        Ok(())
    }

    // Cached record first, then the log. Loading from the log does not cache the record, so
    // that `restore` still sees it as new.
    fn lookup(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<ParticipantLocalRecord>, CommitError> {
        if let Some(record) = self.records.lock().get(transaction_id).cloned() {
            return Ok(Some(record));
        }

        let entries: Vec<LogEntry> = self
            .log
            .load(transaction_id)?
            .into_iter()
            .filter(|entry| entry.actor() == &self.id)
            .collect();

        Ok(ParticipantLocalRecord::replay(&entries)?)
    }

    fn entry(
        &self,
        record: &ParticipantLocalRecord,
        to: ParticipantState,
        payload: LogPayload,
    ) -> LogEntry {
        LogEntry::new(
            *record.transaction_id(),
            self.id.clone(),
            Some(record.state().into()),
            to.into(),
            payload,
            self.time_source.now(),
        )
    }

    fn release(&self, transaction_id: &TransactionId, payload: &PreparedPayload) {
        if let Err(err) = self.resource_manager.abort(payload) {
            warn!(
                "Unable to release resources of transaction {} on {}: {}",
                transaction_id, self.id, err
            );
        }
    }
}
