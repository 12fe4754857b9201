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

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{CommitError, InvalidStateError, TransportError};
use crate::links::Transport;
use crate::process::ProcessId;
use crate::time::{SystemTimeFactory, TimeSource};
use crate::transaction_log::{LogEntry, LogPayload, TransactionLog};

use super::fan_out::FanOut;
use super::CoordinatorConfig;
use super::CoordinatorState;
use super::Decision;
use super::DecisionMessage;
use super::Operation;
use super::Outcome;
use super::PrepareMessage;
use super::Transaction;
use super::TransactionId;
use super::TwoPhaseCommitState;
use super::Vote;

/// The result of driving a transaction to its decision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitOutcome {
    transaction_id: TransactionId,
    outcome: Outcome,
    fully_acknowledged: bool,
}

impl CommitOutcome {
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Whether every participant acknowledged the decision. When `false` the transaction is
    /// resolved but undelivered, and recovery keeps resending the decision.
    pub fn fully_acknowledged(&self) -> bool {
        self.fully_acknowledged
    }
}

/// Drives transactions through the prepare and decision phases.
///
/// A coordinator owns no global state: every instance has its own log, transport and
/// transaction cache. Each transaction sits behind its own lock, so unrelated transactions never
/// wait on each other; the only blocking call is the in-flight [`begin`](Coordinator::begin).
///
/// Every transition is appended to the [`TransactionLog`] before it takes effect in memory, and
/// the decision is logged before any participant hears of it.
pub struct Coordinator {
    id: ProcessId,
    log: Arc<dyn TransactionLog>,
    transport: Arc<dyn Transport>,
    config: CoordinatorConfig,
    time_source: Box<dyn TimeSource>,
    transactions: Mutex<HashMap<TransactionId, Arc<Mutex<Transaction>>>>,
}

impl Coordinator {
    pub fn new(
        id: ProcessId,
        log: Arc<dyn TransactionLog>,
        transport: Arc<dyn Transport>,
        config: CoordinatorConfig,
    ) -> Self {
        Coordinator {
            id,
            log,
            transport,
            config,
            time_source: Box::new(SystemTimeFactory::new()),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the clock used for log timestamps and deadlines.
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub(crate) fn log(&self) -> &dyn TransactionLog {
        self.log.as_ref()
    }

    /// Runs a new transaction across `participants` and returns once it is decided.
    ///
    /// `operations` maps a participant to the work it is asked to prepare; participants without
    /// an entry receive an empty operation list. `timeout` bounds the prepare phase only: any
    /// vote missing when it expires counts as NO.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::InvalidRequest`] if `participants` is empty or `operations` names a
    /// process that is not a participant. Returns [`CommitError::Log`] if the transaction could
    /// not be made durable up to its decision. Failure to deliver the decision is not an error;
    /// it is reported through [`CommitOutcome::fully_acknowledged`].
    pub fn begin(
        &self,
        participants: BTreeSet<ProcessId>,
        operations: BTreeMap<ProcessId, Vec<Operation>>,
        timeout: Duration,
    ) -> Result<CommitOutcome, CommitError> {
        if participants.is_empty() {
            return Err(CommitError::InvalidRequest(
                "a transaction requires at least one participant".into(),
            ));
        }

        if let Some(stranger) = operations.keys().find(|p| !participants.contains(*p)) {
            return Err(CommitError::InvalidRequest(format!(
                "operations addressed to {}, which is not a participant",
                stranger
            )));
        }

        let now = self.time_source.now();
        let deadline = deadline_after(now, timeout)?;
        let id = TransactionId::new();

        let begin = LogEntry::new(
            id,
            self.id.clone(),
            None,
            TwoPhaseCommitState::Init,
            LogPayload::Begin {
                participants: participants.iter().cloned().collect(),
                operations: operations.clone(),
                deadline,
            },
            now,
        );
        self.log.append(begin).map_err(|err| {
            error!("Unable to log the start of transaction {}: {}", id, err);
            err
        })?;

        info!(
            coordinator = %self.id,
            transaction_id = %id,
            participants = participants.len(),
            "Transaction started"
        );

        let transaction = Arc::new(Mutex::new(Transaction::new(
            id,
            participants,
            operations,
            now,
            deadline,
        )));
        self.transactions
            .lock()
            .insert(id, Arc::clone(&transaction));

        self.transition(
            &mut transaction.lock(),
            CoordinatorState::Preparing,
            LogPayload::None,
        )?;

        self.drive(&transaction, deadline, false)
    }

    /// Returns the coordinator's view of a transaction, replaying the log if it is not cached.
    pub fn query_state(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Transaction>, CommitError> {
        if let Some(transaction) = self.cached(transaction_id) {
            return Ok(Some(transaction.lock().clone()));
        }

        let entries: Vec<LogEntry> = self
            .log
            .load(transaction_id)?
            .into_iter()
            .filter(|entry| entry.actor() == &self.id)
            .collect();

        if entries.is_empty() {
            return Ok(None);
        }

        Ok(Some(Transaction::replay(&entries)?))
    }

    /// Answers a participant asking for the outcome of a transaction.
    ///
    /// Returns `None` while the transaction is undecided. A transaction this coordinator has no
    /// record of is presumed aborted: the start of a transaction is logged before any PREPARE is
    /// sent, so no participant can hold a YES vote for it.
    pub fn query_decision(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Decision>, CommitError> {
        match self.query_state(transaction_id)? {
            Some(transaction) => Ok(transaction.decision()),
            None => {
                debug!(
                    "Transaction {} is unknown to {}, presuming abort",
                    transaction_id, self.id
                );
                Ok(Some(Decision::Abort))
            }
        }
    }

    /// Drops a finished transaction from the cache. Its log entries are untouched.
    ///
    /// Transactions are evicted on their own once every participant acknowledged the decision;
    /// this covers a transaction that was cached again, for example by recovery. Returns `false`
    /// if the transaction was not cached.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::InvalidState`] if the transaction is not done.
    pub fn forget(&self, transaction_id: &TransactionId) -> Result<bool, CommitError> {
        let mut transactions = self.transactions.lock();
        let state = match transactions.get(transaction_id) {
            Some(transaction) => transaction.lock().state(),
            None => return Ok(false),
        };

        if state != CoordinatorState::Done {
            return Err(InvalidStateError::with_message(format!(
                "transaction {} is {:?} and can not be forgotten",
                transaction_id, state
            ))
            .into());
        }

        transactions.remove(transaction_id);
        Ok(true)
    }

    /// Caches a replayed transaction, keeping any copy that is already cached.
    pub(crate) fn restore(&self, transaction: Transaction) -> Arc<Mutex<Transaction>> {
        let mut transactions = self.transactions.lock();
        Arc::clone(
            transactions
                .entry(*transaction.id())
                .or_insert_with(|| Arc::new(Mutex::new(transaction))),
        )
    }

    /// Continues a replayed transaction from wherever its log left off.
    ///
    /// An undecided transaction gets a fresh prepare phase bounded by the configured
    /// `prepare_timeout`; participants are asked for the vote they already logged before they
    /// are sent PREPARE again.
    pub(crate) fn resume(
        &self,
        transaction: &Arc<Mutex<Transaction>>,
    ) -> Result<CommitOutcome, CommitError> {
        {
            let mut transaction = transaction.lock();
            if transaction.state() == CoordinatorState::Init {
                self.transition(
                    &mut transaction,
                    CoordinatorState::Preparing,
                    LogPayload::None,
                )?;
            }
        }

        let deadline = deadline_after(self.time_source.now(), self.config.prepare_timeout())?;
        self.drive(transaction, deadline, true)
    }

    fn cached(&self, transaction_id: &TransactionId) -> Option<Arc<Mutex<Transaction>>> {
        self.transactions.lock().get(transaction_id).cloned()
    }

    fn drive(
        &self,
        transaction: &Arc<Mutex<Transaction>>,
        deadline: SystemTime,
        query_first: bool,
    ) -> Result<CommitOutcome, CommitError> {
        let decided = transaction.lock().decision();
        let decision = match decided {
            Some(decision) => decision,
            None => {
                self.prepare(transaction, deadline, query_first)?;
                self.decide(transaction)?
            }
        };

        let fully_acknowledged = self.deliver(transaction, decision)?;
        let transaction_id = *transaction.lock().id();

        // A finished transaction is answered from the log from now on.
        if fully_acknowledged {
            self.transactions.lock().remove(&transaction_id);
        }

        Ok(CommitOutcome {
            transaction_id,
            outcome: decision.into(),
            fully_acknowledged,
        })
    }

    // Collects votes until every participant answered, one refused, or the deadline passed.
    fn prepare(
        &self,
        transaction: &Arc<Mutex<Transaction>>,
        deadline: SystemTime,
        query_first: bool,
    ) -> Result<(), CommitError> {
        let (transaction_id, pending, messages) = {
            let transaction = transaction.lock();
            if transaction.tally().is_some() {
                return Ok(());
            }

            let pending = transaction.pending_votes();
            let messages: HashMap<ProcessId, PrepareMessage> = pending
                .iter()
                .map(|participant| {
                    (
                        participant.clone(),
                        PrepareMessage::new(
                            *transaction.id(),
                            self.id.clone(),
                            transaction.operations_for(participant).to_vec(),
                        ),
                    )
                })
                .collect();

            (*transaction.id(), pending, messages)
        };

        debug!(
            "Sending PREPARE for transaction {} to {} participants",
            transaction_id,
            pending.len()
        );

        let transport = Arc::clone(&self.transport);
        let mut replies = FanOut::spawn(pending, move |participant| {
            let message = messages.get(participant).ok_or_else(|| {
                TransportError::Internal(format!("no PREPARE message for {}", participant))
            })?;

            if query_first {
                if let Some(vote) = transport.query_vote(participant, &message.transaction_id)? {
                    return Ok(vote);
                }
            }

            transport.send_prepare(participant, message)
        });

        let until = Instant::now() + self.time_source.remaining(deadline);
        while let Some((participant, reply)) = replies.next(until) {
            match reply {
                Ok(vote) => {
                    debug!(
                        "{} voted {:?} on transaction {}",
                        participant, vote, transaction_id
                    );
                    self.transition(
                        &mut transaction.lock(),
                        CoordinatorState::Preparing,
                        LogPayload::Vote {
                            participant: participant.clone(),
                            vote,
                        },
                    )?;

                    if vote == Vote::No {
                        info!(
                            "{} refused transaction {}, aborting early",
                            participant, transaction_id
                        );
                        return Ok(());
                    }
                }
                Err(err) => {
                    warn!(
                        "No vote from {} on transaction {}, counting it as NO: {}",
                        participant, transaction_id, err
                    );
                    return Ok(());
                }
            }
        }

        if replies.outstanding() > 0 {
            warn!(
                "Prepare phase of transaction {} timed out with {} votes missing",
                transaction_id,
                replies.outstanding()
            );
        }

        Ok(())
    }

    fn decide(&self, transaction: &Arc<Mutex<Transaction>>) -> Result<Decision, CommitError> {
        let mut transaction = transaction.lock();
        let decision = transaction.tally().unwrap_or(Decision::Abort);

        self.transition(
            &mut transaction,
            CoordinatorState::deciding(decision),
            LogPayload::Decision { decision },
        )?;

        info!(
            coordinator = %self.id,
            transaction_id = %transaction.id(),
            %decision,
            "Transaction decided"
        );

        Ok(decision)
    }

    // Sends the decision until every participant acknowledged it or the retry policy is spent.
    // Returns whether the transaction reached DONE.
    fn deliver(
        &self,
        transaction: &Arc<Mutex<Transaction>>,
        decision: Decision,
    ) -> Result<bool, CommitError> {
        let transaction_id = *transaction.lock().id();
        let message = DecisionMessage::new(transaction_id, decision);
        let retry = self.config.retry();

        for attempt in 0..retry.max_attempts() {
            let pending = transaction.lock().unacknowledged();
            if pending.is_empty() {
                break;
            }

            if attempt > 0 {
                let backoff = retry.backoff(attempt - 1);
                debug!(
                    "Retrying decision for transaction {} to {} participants in {:?}",
                    transaction_id,
                    pending.len(),
                    backoff
                );
                thread::sleep(backoff);
            }

            let transport = Arc::clone(&self.transport);
            let mut replies = FanOut::spawn(pending, move |participant| {
                transport.send_decision(participant, &message)
            });

            let until = Instant::now() + self.config.ack_timeout();
            while let Some((participant, reply)) = replies.next(until) {
                match reply {
                    Ok(()) => {
                        let mut transaction = transaction.lock();
                        let state = transaction.state();
                        if let Err(err) = self.transition(
                            &mut transaction,
                            state,
                            LogPayload::Acknowledged {
                                participant: participant.clone(),
                            },
                        ) {
                            warn!(
                                "Unable to record acknowledgement of transaction {} from {}: {}",
                                transaction_id, participant, err
                            );
                        }
                    }
                    Err(err) => warn!(
                        "Decision {} for transaction {} not delivered to {}: {}",
                        decision, transaction_id, participant, err
                    ),
                }
            }
        }

        let mut transaction = transaction.lock();
        let unacknowledged = transaction.unacknowledged();
        if !unacknowledged.is_empty() {
            warn!(
                "Transaction {} is resolved ({}) but undelivered to {:?}",
                transaction_id, decision, unacknowledged
            );
            return Ok(false);
        }

        if transaction.state() != CoordinatorState::Done {
            if let Err(err) =
                self.transition(&mut transaction, CoordinatorState::Done, LogPayload::None)
            {
                warn!(
                    "Unable to mark transaction {} as done, recovery will retry: {}",
                    transaction_id, err
                );
                return Ok(false);
            }
            info!("Transaction {} is done", transaction_id);
        }

        Ok(true)
    }

    // Validates, logs, then applies a transition. A duplicate is neither logged nor applied.
    fn transition(
        &self,
        transaction: &mut Transaction,
        to: CoordinatorState,
        payload: LogPayload,
    ) -> Result<bool, CommitError> {
        let entry = LogEntry::new(
            *transaction.id(),
            self.id.clone(),
            Some(transaction.state().into()),
            to.into(),
            payload,
            self.time_source.now(),
        );

        if !transaction.check(&entry)? {
            return Ok(false);
        }

        self.log.append(entry.clone()).map_err(|err| {
            error!(
                "Unable to log transition of transaction {} from {:?} to {:?}: {}",
                transaction.id(),
                transaction.state(),
                to,
                err
            );
            err
        })?;

        transaction.apply(&entry)?;
        Ok(true)
    }
}

fn deadline_after(now: SystemTime, timeout: Duration) -> Result<SystemTime, CommitError> {
    now.checked_add(timeout).ok_or_else(|| {
        CommitError::InvalidRequest(format!("timeout {:?} is out of range", timeout))
    })
}

#[cfg(test)]
mod tests {
    use crate::transaction_log::MemoryTransactionLog;
    use crate::two_phase_commit::CoordinatorConfigBuilder;

    use super::*;

    // Votes and acknowledges from a fixed script, without any participant behind it.
    struct ScriptedTransport {
        votes: HashMap<ProcessId, Result<Vote, TransportError>>,
        acks: Mutex<Vec<ProcessId>>,
    }

    impl ScriptedTransport {
        fn new(votes: &[(&str, Result<Vote, TransportError>)]) -> Self {
            ScriptedTransport {
                votes: votes
                    .iter()
                    .map(|(p, v)| (ProcessId::from(*p), v.clone()))
                    .collect(),
                acks: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send_prepare(
            &self,
            participant: &ProcessId,
            _message: &PrepareMessage,
        ) -> Result<Vote, TransportError> {
            self.votes
                .get(participant)
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Unreachable(participant.clone())))
        }

        fn send_decision(
            &self,
            participant: &ProcessId,
            _message: &DecisionMessage,
        ) -> Result<(), TransportError> {
            self.acks.lock().push(participant.clone());
            Ok(())
        }

        fn query_vote(
            &self,
            _participant: &ProcessId,
            _transaction_id: &TransactionId,
        ) -> Result<Option<Vote>, TransportError> {
            Ok(None)
        }

        fn query_decision(
            &self,
            _coordinator: &ProcessId,
            _transaction_id: &TransactionId,
        ) -> Result<Option<Decision>, TransportError> {
            Ok(None)
        }
    }

    fn coordinator(transport: ScriptedTransport) -> (Coordinator, MemoryTransactionLog) {
        let log = MemoryTransactionLog::new();
        let config = CoordinatorConfigBuilder::new()
            .with_ack_timeout(Duration::from_millis(200))
            .with_initial_backoff(Duration::from_millis(1))
            .with_max_backoff(Duration::from_millis(5))
            .build()
            .unwrap();
        let coordinator = Coordinator::new(
            "coordinator".into(),
            Arc::new(log.clone()),
            Arc::new(transport),
            config,
        );
        (coordinator, log)
    }

    fn participants(ids: &[&str]) -> BTreeSet<ProcessId> {
        ids.iter().map(|id| ProcessId::from(*id)).collect()
    }

    #[test]
    fn begin_rejects_invalid_requests() {
        let (coordinator, log) = coordinator(ScriptedTransport::new(&[]));

        assert!(matches!(
            coordinator.begin(BTreeSet::new(), BTreeMap::new(), Duration::from_secs(1)),
            Err(CommitError::InvalidRequest(_))
        ));

        let mut operations = BTreeMap::new();
        operations.insert(ProcessId::from("stranger"), vec![]);
        assert!(matches!(
            coordinator.begin(participants(&["p1"]), operations, Duration::from_secs(1)),
            Err(CommitError::InvalidRequest(_))
        ));

        assert!(log.is_empty());
    }

    #[test]
    fn all_yes_commits_and_logs_every_step() {
        let (coordinator, log) = coordinator(ScriptedTransport::new(&[
            ("p1", Ok(Vote::Yes)),
            ("p2", Ok(Vote::Yes)),
        ]));

        let outcome = coordinator
            .begin(participants(&["p1", "p2"]), BTreeMap::new(), Duration::from_secs(5))
            .unwrap();

        assert_eq!(outcome.outcome(), Outcome::Committed);
        assert!(outcome.fully_acknowledged());

        let states: Vec<TwoPhaseCommitState> =
            log.entries().iter().map(|e| e.to_state()).collect();
        assert_eq!(states.first(), Some(&TwoPhaseCommitState::Init));
        assert_eq!(states.last(), Some(&TwoPhaseCommitState::Done));
        // begin, preparing, 2 votes, decision, 2 acks, done
        assert_eq!(states.len(), 8);

        let transaction = coordinator
            .query_state(outcome.transaction_id())
            .unwrap()
            .unwrap();
        assert_eq!(transaction.state(), CoordinatorState::Done);
        assert_eq!(transaction.decision(), Some(Decision::Commit));
    }

    #[test]
    fn unreachable_participant_aborts() {
        let (coordinator, _log) = coordinator(ScriptedTransport::new(&[("p1", Ok(Vote::Yes))]));

        let outcome = coordinator
            .begin(participants(&["p1", "p2"]), BTreeMap::new(), Duration::from_secs(5))
            .unwrap();

        assert_eq!(outcome.outcome(), Outcome::Aborted);
        assert_eq!(
            coordinator.query_decision(outcome.transaction_id()).unwrap(),
            Some(Decision::Abort)
        );
    }

    #[test]
    fn unknown_transaction_is_presumed_aborted() {
        let (coordinator, _log) = coordinator(ScriptedTransport::new(&[]));
        assert_eq!(
            coordinator.query_decision(&TransactionId::new()).unwrap(),
            Some(Decision::Abort)
        );
        assert!(coordinator.query_state(&TransactionId::new()).unwrap().is_none());
    }

    #[test]
    fn done_transaction_is_evicted_and_replayed_on_demand() {
        let (coordinator, log) = coordinator(ScriptedTransport::new(&[("p1", Ok(Vote::Yes))]));
        let outcome = coordinator
            .begin(participants(&["p1"]), BTreeMap::new(), Duration::from_secs(5))
            .unwrap();
        let id = outcome.transaction_id();

        assert!(coordinator.transactions.lock().is_empty());
        assert!(!coordinator.forget(id).unwrap());

        let replayed = coordinator.query_state(id).unwrap().unwrap();
        assert_eq!(replayed.state(), CoordinatorState::Done);
        assert_eq!(replayed.decision(), Some(Decision::Commit));
        assert_eq!(replayed.created_at(), log.entries()[0].timestamp());
    }

    #[test]
    fn forget_drops_restored_done_transaction() {
        let (coordinator, _log) = coordinator(ScriptedTransport::new(&[("p1", Ok(Vote::Yes))]));
        let outcome = coordinator
            .begin(participants(&["p1"]), BTreeMap::new(), Duration::from_secs(5))
            .unwrap();
        let transaction = coordinator.restore(
            coordinator
                .query_state(outcome.transaction_id())
                .unwrap()
                .unwrap(),
        );

        assert_eq!(coordinator.transactions.lock().len(), 1);
        assert_eq!(transaction.lock().state(), CoordinatorState::Done);
        assert!(coordinator.forget(outcome.transaction_id()).unwrap());
        assert!(coordinator.transactions.lock().is_empty());
    }
}
