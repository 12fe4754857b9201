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

//! End-to-end protocol scenarios over an in-process transport.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use concord::error::{CommitError, InternalError, LogError, TransportError};
use concord::links::{LocalTransport, Transport};
use concord::recovery::RecoveryManager;
use concord::transaction_log::{LogEntry, LogPayload, MemoryTransactionLog, TransactionLog};
use concord::two_phase_commit::{
    CommitOutcome, Coordinator, CoordinatorConfig, CoordinatorConfigBuilder, Decision,
    DecisionMessage, Operation, Outcome, Participant, ParticipantState, PrepareMessage,
    PreparedPayload, ResourceManager, TransactionId, TwoPhaseCommitState, Vote,
};
use concord::ProcessId;

/// A resource manager that refuses operations of type "reject" and counts every call. With a
/// gate, `can_commit` waits at the gate and refuses if it is not opened in time.
#[derive(Default)]
struct Ledger {
    gate: Option<Arc<Gate>>,
    prepares: AtomicUsize,
    commits: AtomicUsize,
    aborts: AtomicUsize,
    restores: AtomicUsize,
}

impl Ledger {
    fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl ResourceManager for Ledger {
    fn can_commit(&self, operations: &[Operation]) -> Result<bool, InternalError> {
        if let Some(gate) = &self.gate {
            if !gate.pass() {
                return Ok(false);
            }
        }
        Ok(!operations.iter().any(|op| op.kind == "reject"))
    }

    fn prepare(&self, operations: &[Operation]) -> Result<PreparedPayload, InternalError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        serde_json::to_vec(operations)
            .map(PreparedPayload::new)
            .map_err(|err| InternalError::from_source(Box::new(err)))
    }

    fn commit(&self, _payload: &PreparedPayload) -> Result<(), InternalError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&self, _payload: &PreparedPayload) -> Result<(), InternalError> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&self, _payload: &PreparedPayload) -> Result<(), InternalError> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Injects faults in front of a `LocalTransport`: decisions to some processes are lost, as if
/// the coordinator crashed before sending them, and PREPARE to some processes is slowed down.
struct FaultyTransport {
    inner: Arc<LocalTransport>,
    lost_decisions: HashSet<ProcessId>,
    slow_prepares: HashMap<ProcessId, Duration>,
}

impl FaultyTransport {
    fn new(inner: Arc<LocalTransport>) -> Self {
        FaultyTransport {
            inner,
            lost_decisions: HashSet::new(),
            slow_prepares: HashMap::new(),
        }
    }

    fn losing_decisions_to(mut self, process: &ProcessId) -> Self {
        self.lost_decisions.insert(process.clone());
        self
    }

    fn slowing_prepare_to(mut self, process: &ProcessId, delay: Duration) -> Self {
        self.slow_prepares.insert(process.clone(), delay);
        self
    }
}

impl Transport for FaultyTransport {
    fn send_prepare(
        &self,
        participant: &ProcessId,
        message: &PrepareMessage,
    ) -> Result<Vote, TransportError> {
        if let Some(delay) = self.slow_prepares.get(participant) {
            thread::sleep(*delay);
        }
        self.inner.send_prepare(participant, message)
    }

    fn send_decision(
        &self,
        participant: &ProcessId,
        message: &DecisionMessage,
    ) -> Result<(), TransportError> {
        if self.lost_decisions.contains(participant) {
            return Err(TransportError::Unreachable(participant.clone()));
        }
        self.inner.send_decision(participant, message)
    }

    fn query_vote(
        &self,
        participant: &ProcessId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Vote>, TransportError> {
        self.inner.query_vote(participant, transaction_id)
    }

    fn query_decision(
        &self,
        coordinator: &ProcessId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Decision>, TransportError> {
        self.inner.query_decision(coordinator, transaction_id)
    }
}

/// Lets callers block until a number of threads have arrived, and arriving threads block until
/// the gate is opened. Every wait is bounded so a broken ordering fails the test instead of
/// hanging it.
#[derive(Default)]
struct Gate {
    state: Mutex<(usize, bool)>,
    changed: Condvar,
}

impl Gate {
    /// Registers the caller and waits for the gate to open. Returns whether it opened in time.
    fn pass(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.0 += 1;
        self.changed.notify_all();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, GATE_TIMEOUT, |(_, open)| !*open)
            .unwrap();
        state.1
    }

    /// Waits until `count` callers are inside `pass`. Returns whether they arrived in time.
    fn wait_for(&self, count: usize) -> bool {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, GATE_TIMEOUT, |(arrived, _)| *arrived < count)
            .unwrap();
        state.0 >= count
    }

    fn open(&self) {
        self.state.lock().unwrap().1 = true;
        self.changed.notify_all();
    }
}

const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// A log that fails every append while `failing` is set.
#[derive(Default)]
struct UnreliableLog {
    inner: MemoryTransactionLog,
    failing: AtomicBool,
}

impl TransactionLog for UnreliableLog {
    fn append(&self, entry: LogEntry) -> Result<(), LogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LogError::Internal(InternalError::with_message(
                "disk full",
            )));
        }
        self.inner.append(entry)
    }

    fn scan_incomplete(&self, actor: &ProcessId) -> Result<Vec<LogEntry>, LogError> {
        self.inner.scan_incomplete(actor)
    }

    fn load(&self, transaction_id: &TransactionId) -> Result<Vec<LogEntry>, LogError> {
        self.inner.load(transaction_id)
    }
}

struct Node {
    id: ProcessId,
    log: MemoryTransactionLog,
    ledger: Arc<Ledger>,
    participant: Arc<Participant>,
}

impl Node {
    /// Starts a participant and registers it with `transport`.
    fn start(id: &str, transport: &LocalTransport) -> Self {
        Self::restart(ProcessId::from(id), MemoryTransactionLog::new(), transport)
    }

    /// Starts a participant whose resource manager waits at `gate` before voting.
    fn start_gated(id: &str, transport: &LocalTransport, gate: Arc<Gate>) -> Self {
        let ledger = Ledger {
            gate: Some(gate),
            ..Default::default()
        };
        Self::with_ledger(
            ProcessId::from(id),
            MemoryTransactionLog::new(),
            transport,
            ledger,
        )
    }

    /// Starts a participant over an existing log, replacing any earlier registration.
    fn restart(id: ProcessId, log: MemoryTransactionLog, transport: &LocalTransport) -> Self {
        Self::with_ledger(id, log, transport, Ledger::default())
    }

    fn with_ledger(
        id: ProcessId,
        log: MemoryTransactionLog,
        transport: &LocalTransport,
        ledger: Ledger,
    ) -> Self {
        let ledger = Arc::new(ledger);
        let participant = Arc::new(Participant::new(
            id.clone(),
            Arc::new(log.clone()),
            ledger.clone(),
        ));
        transport.register_participant(participant.clone());
        Node {
            id,
            log,
            ledger,
            participant,
        }
    }
}

fn config() -> CoordinatorConfig {
    CoordinatorConfigBuilder::new()
        .with_prepare_timeout(Duration::from_secs(2))
        .with_ack_timeout(Duration::from_secs(2))
        .with_max_delivery_attempts(2)
        .with_initial_backoff(Duration::from_millis(5))
        .with_max_backoff(Duration::from_millis(20))
        .build()
        .expect("valid config")
}

fn coordinator(
    log: Arc<dyn TransactionLog>,
    transport: Arc<dyn Transport>,
    registry: &LocalTransport,
) -> Arc<Coordinator> {
    let coordinator = Arc::new(Coordinator::new("coordinator".into(), log, transport, config()));
    registry.register_coordinator(&coordinator);
    coordinator
}

fn ids(nodes: &[&Node]) -> BTreeSet<ProcessId> {
    nodes.iter().map(|node| node.id.clone()).collect()
}

fn transfer(nodes: &[&Node]) -> BTreeMap<ProcessId, Vec<Operation>> {
    nodes
        .iter()
        .map(|node| {
            (
                node.id.clone(),
                vec![Operation::new(
                    "debit",
                    format!("{}/account", node.id),
                    serde_json::json!({ "amount": 10 }),
                )],
            )
        })
        .collect()
}

fn begin(coordinator: &Coordinator, nodes: &[&Node]) -> CommitOutcome {
    coordinator
        .begin(ids(nodes), transfer(nodes), Duration::from_secs(2))
        .expect("decision logged")
}

#[test]
fn all_yes_commits_everywhere_exactly_once() {
    let transport = Arc::new(LocalTransport::new());
    let nodes = [
        Node::start("p1", &transport),
        Node::start("p2", &transport),
        Node::start("p3", &transport),
    ];
    let all: Vec<&Node> = nodes.iter().collect();
    let coordinator = coordinator(
        Arc::new(MemoryTransactionLog::new()),
        transport.clone(),
        &transport,
    );

    let outcome = begin(&coordinator, &all);

    assert_eq!(outcome.outcome(), Outcome::Committed);
    assert!(outcome.fully_acknowledged());
    for node in &nodes {
        assert_eq!(node.ledger.commits(), 1);
        assert_eq!(node.ledger.aborts(), 0);
        assert_eq!(
            node.participant.state(outcome.transaction_id()).unwrap(),
            Some(ParticipantState::Committed)
        );
    }
}

#[test]
fn single_no_vote_aborts_everywhere() {
    let transport = Arc::new(LocalTransport::new());
    let nodes = [
        Node::start("p1", &transport),
        Node::start("p2", &transport),
        Node::start("p3", &transport),
    ];
    let coordinator = coordinator(
        Arc::new(MemoryTransactionLog::new()),
        transport.clone(),
        &transport,
    );

    // p2 answers last, after p1 and p3 have prepared.
    transport.set_delay(&nodes[1].id, Duration::from_millis(200));
    let mut operations = transfer(&[&nodes[0], &nodes[2]]);
    operations.insert(
        nodes[1].id.clone(),
        vec![Operation::new("reject", "p2/account", serde_json::Value::Null)],
    );

    let outcome = coordinator
        .begin(
            ids(&nodes.iter().collect::<Vec<_>>()),
            operations,
            Duration::from_secs(2),
        )
        .unwrap();

    assert_eq!(outcome.outcome(), Outcome::Aborted);
    let tx = outcome.transaction_id();

    for node in [&nodes[0], &nodes[2]] {
        assert_eq!(node.ledger.aborts(), 1);
        assert_eq!(node.ledger.commits(), 0);
        assert_eq!(
            node.participant.state(tx).unwrap(),
            Some(ParticipantState::Aborted)
        );
    }

    // The NO voter never prepared, so there was nothing to roll back.
    assert_eq!(nodes[1].ledger.prepares(), 0);
    assert_eq!(nodes[1].ledger.aborts(), 0);
    assert_eq!(
        nodes[1].participant.state(tx).unwrap(),
        Some(ParticipantState::Aborted)
    );
    assert_eq!(nodes[1].participant.query_vote(tx).unwrap(), Some(Vote::No));
}

#[test]
fn prepare_timeout_aborts_yes_voters() {
    let transport = Arc::new(LocalTransport::new());
    let nodes = [
        Node::start("p1", &transport),
        Node::start("p2", &transport),
        Node::start("p3", &transport),
    ];
    let all: Vec<&Node> = nodes.iter().collect();
    let coordinator = coordinator(
        Arc::new(MemoryTransactionLog::new()),
        transport.clone(),
        &transport,
    );

    transport.set_delay(&nodes[2].id, Duration::from_millis(500));
    let outcome = coordinator
        .begin(ids(&all), transfer(&all), Duration::from_millis(150))
        .unwrap();

    assert_eq!(outcome.outcome(), Outcome::Aborted);
    let transaction = coordinator
        .query_state(outcome.transaction_id())
        .unwrap()
        .unwrap();
    assert_eq!(transaction.decision(), Some(Decision::Abort));
    assert!(!transaction.votes().contains_key(&nodes[2].id));

    for node in [&nodes[0], &nodes[1]] {
        assert_eq!(node.ledger.prepares(), 1);
        assert_eq!(node.ledger.aborts(), 1);
        assert_eq!(node.ledger.commits(), 0);
    }
}

#[test]
fn prepare_arriving_after_abort_is_answered_no() {
    let transport = Arc::new(LocalTransport::new());
    let nodes = [
        Node::start("p1", &transport),
        Node::start("p2", &transport),
        Node::start("p3", &transport),
    ];
    let all: Vec<&Node> = nodes.iter().collect();
    let slow = Arc::new(
        FaultyTransport::new(transport.clone())
            .slowing_prepare_to(&nodes[2].id, Duration::from_millis(400)),
    );
    let coordinator = coordinator(Arc::new(MemoryTransactionLog::new()), slow, &transport);

    let outcome = coordinator
        .begin(ids(&all), transfer(&all), Duration::from_millis(100))
        .unwrap();
    let tx = *outcome.transaction_id();

    assert_eq!(outcome.outcome(), Outcome::Aborted);
    assert!(outcome.fully_acknowledged());

    // Let the delayed PREPARE reach p3 after the ABORT.
    thread::sleep(Duration::from_millis(600));

    let p3 = &nodes[2];
    assert_eq!(
        p3.participant.state(&tx).unwrap(),
        Some(ParticipantState::Aborted)
    );
    assert!(p3.participant.blocked().is_empty());
    assert_eq!(p3.participant.query_vote(&tx).unwrap(), None);
    assert_eq!(p3.ledger.prepares(), 0);
    assert_eq!(p3.ledger.aborts(), 0);
    assert_eq!(p3.log.entries().len(), 1);
}

#[test]
fn concurrent_transactions_prepare_in_parallel() {
    let transport = Arc::new(LocalTransport::new());
    let gate = Arc::new(Gate::default());
    let p1 = Node::start_gated("p1", &transport, gate.clone());
    let p2 = Node::start("p2", &transport);
    let coordinator = coordinator(
        Arc::new(MemoryTransactionLog::new()),
        transport.clone(),
        &transport,
    );

    let outcomes = thread::scope(|scope| {
        let first = scope.spawn(|| begin(&coordinator, &[&p1, &p2]));
        let second = scope.spawn(|| begin(&coordinator, &[&p1, &p2]));

        // Both transactions are inside p1's vote at the same time.
        assert!(gate.wait_for(2));
        gate.open();

        [first.join().unwrap(), second.join().unwrap()]
    });

    assert_ne!(outcomes[0].transaction_id(), outcomes[1].transaction_id());
    for outcome in &outcomes {
        assert_eq!(outcome.outcome(), Outcome::Committed);
        assert!(outcome.fully_acknowledged());
    }
    assert_eq!(p1.ledger.commits(), 2);
    assert_eq!(p2.ledger.commits(), 2);
}

#[test]
fn decision_waits_for_vote_in_progress() {
    let transport = LocalTransport::new();
    let gate = Arc::new(Gate::default());
    let node = Node::start_gated("p1", &transport, gate.clone());
    let tx = TransactionId::new();
    let operations = transfer(&[&node]).remove(&node.id).unwrap();
    let coordinator = ProcessId::from("coordinator");

    thread::scope(|scope| {
        let prepare =
            scope.spawn(|| {
            node.participant
                .handle_prepare(&tx, &coordinator, &operations)
                .map_err(|e| e.to_string())
        });
        assert!(gate.wait_for(1));

        let decision = scope.spawn(|| {
            node.participant
                .handle_decision(&tx, Decision::Commit)
                .map_err(|e| e.to_string())
        });
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(100) {
            assert!(!decision.is_finished());
            thread::sleep(Duration::from_millis(10));
        }
        assert!(node.log.entries().is_empty());

        gate.open();
        assert_eq!(prepare.join().unwrap().unwrap(), Vote::Yes);
        decision.join().unwrap().unwrap();
    });

    assert_eq!(
        node.participant.state(&tx).unwrap(),
        Some(ParticipantState::Committed)
    );
    assert_eq!(node.ledger.prepares(), 1);
    assert_eq!(node.ledger.commits(), 1);

    let entries = node.log.entries();
    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[0].payload(), LogPayload::Prepared { .. }));
    assert!(matches!(
        entries[1].payload(),
        LogPayload::Resolved {
            decision: Decision::Commit
        }
    ));
}

#[test]
fn recovery_resends_logged_decision_to_unacknowledged_participant() {
    let transport = Arc::new(LocalTransport::new());
    let nodes = [
        Node::start("p1", &transport),
        Node::start("p2", &transport),
        Node::start("p3", &transport),
    ];
    let all: Vec<&Node> = nodes.iter().collect();
    let log = MemoryTransactionLog::new();

    let crashing =
        Arc::new(FaultyTransport::new(transport.clone()).losing_decisions_to(&nodes[1].id));
    let first = coordinator(Arc::new(log.clone()), crashing, &transport);
    let outcome = begin(&first, &all);
    let tx = *outcome.transaction_id();

    assert_eq!(outcome.outcome(), Outcome::Committed);
    assert!(!outcome.fully_acknowledged());
    assert_eq!(
        nodes[1].participant.state(&tx).unwrap(),
        Some(ParticipantState::Prepared)
    );
    drop(first);

    let restarted = coordinator(Arc::new(log.clone()), transport.clone(), &transport);
    let report = RecoveryManager::new(transport.clone())
        .recover_coordinator(&restarted)
        .unwrap();

    assert_eq!(report.redelivered(), &[tx]);
    assert_eq!(report.completed(), &[tx]);
    assert!(report.decided().is_empty());
    for node in &nodes {
        assert_eq!(node.ledger.commits(), 1);
        assert_eq!(
            node.participant.state(&tx).unwrap(),
            Some(ParticipantState::Committed)
        );
    }

    // A duplicate COMMIT to an acknowledged participant changes nothing.
    transport
        .send_decision(&nodes[0].id, &DecisionMessage::new(tx, Decision::Commit))
        .unwrap();
    assert_eq!(nodes[0].ledger.commits(), 1);

    assert_eq!(
        log.entries().last().map(LogEntry::to_state),
        Some(TwoPhaseCommitState::Done)
    );
    assert!(RecoveryManager::new(transport.clone())
        .recover_coordinator(&restarted)
        .unwrap()
        .completed()
        .is_empty());
}

#[test]
fn prepared_participant_stays_blocked_until_decision_arrives() {
    let transport = Arc::new(LocalTransport::new());
    let p1 = Node::start("p1", &transport);
    let p2 = Node::start("p2", &transport);

    let lossy = Arc::new(FaultyTransport::new(transport.clone()).losing_decisions_to(&p2.id));
    let coordinator = coordinator(Arc::new(MemoryTransactionLog::new()), lossy, &transport);
    let outcome = begin(&coordinator, &[&p1, &p2]);
    let tx = *outcome.transaction_id();

    // p2 crashes while prepared and restarts with fresh resource manager state.
    let p2 = Node::restart(p2.id.clone(), p2.log.clone(), &transport);
    assert_eq!(
        p2.participant.state(&tx).unwrap(),
        Some(ParticipantState::Prepared)
    );

    let recovery = RecoveryManager::new(transport.clone());

    transport.partition(coordinator.id());
    let report = recovery.recover_participant(&p2.participant).unwrap();
    assert_eq!(report.blocked(), &[tx]);
    assert!(report.resolved().is_empty());
    assert_eq!(p2.participant.blocked(), vec![tx]);
    assert_eq!(p2.ledger.restores(), 1);
    assert_eq!(p2.ledger.commits(), 0);
    assert_eq!(p2.ledger.aborts(), 0);

    transport.heal(coordinator.id());
    let report = recovery.recover_participant(&p2.participant).unwrap();
    assert_eq!(report.resolved(), &[(tx, Decision::Commit)]);
    assert!(report.blocked().is_empty());
    assert!(p2.participant.blocked().is_empty());
    assert_eq!(p2.ledger.restores(), 1);
    assert_eq!(p2.ledger.commits(), 1);
}

#[test]
fn recovery_collects_missing_votes_without_changing_logged_ones() {
    let transport = Arc::new(LocalTransport::new());
    let p1 = Node::start("p1", &transport);
    let p2 = Node::start("p2", &transport);
    let coordinator_id = ProcessId::from("coordinator");
    let log = MemoryTransactionLog::new();
    let tx = TransactionId::new();
    let operations = transfer(&[&p1, &p2]);

    // The coordinator crashed after recording p1's vote; p2 never saw PREPARE.
    let history = [
        (
            None,
            TwoPhaseCommitState::Init,
            LogPayload::Begin {
                participants: vec![p1.id.clone(), p2.id.clone()],
                operations: operations.clone(),
                deadline: std::time::SystemTime::now(),
            },
        ),
        (
            Some(TwoPhaseCommitState::Init),
            TwoPhaseCommitState::Preparing,
            LogPayload::None,
        ),
        (
            Some(TwoPhaseCommitState::Preparing),
            TwoPhaseCommitState::Preparing,
            LogPayload::Vote {
                participant: p1.id.clone(),
                vote: Vote::Yes,
            },
        ),
    ];
    for (from, to, payload) in history {
        log.append(LogEntry::new(
            tx,
            coordinator_id.clone(),
            from,
            to,
            payload,
            std::time::SystemTime::now(),
        ))
        .unwrap();
    }
    p1.participant
        .handle_prepare(&tx, &coordinator_id, &operations[&p1.id])
        .unwrap();

    let coordinator = coordinator(Arc::new(log), transport.clone(), &transport);
    let report = RecoveryManager::new(transport.clone())
        .recover_coordinator(&coordinator)
        .unwrap();

    assert_eq!(report.decided(), &[tx]);
    assert_eq!(report.completed(), &[tx]);
    assert_eq!(
        coordinator.query_decision(&tx).unwrap(),
        Some(Decision::Commit)
    );
    assert_eq!(p1.ledger.prepares(), 1);
    assert_eq!(p2.ledger.prepares(), 1);
    assert_eq!(p1.ledger.commits(), 1);
    assert_eq!(p2.ledger.commits(), 1);
}

#[test]
fn coordinator_reports_log_failure_before_contacting_participants() {
    let transport = Arc::new(LocalTransport::new());
    let p1 = Node::start("p1", &transport);
    let log = Arc::new(UnreliableLog::default());
    log.failing.store(true, Ordering::SeqCst);
    let coordinator = coordinator(log, transport.clone(), &transport);

    let result = coordinator.begin(ids(&[&p1]), transfer(&[&p1]), Duration::from_secs(1));

    assert!(matches!(result, Err(CommitError::Log(_))));
    assert_eq!(p1.ledger.prepares(), 0);
}

#[test]
fn participant_log_failure_counts_as_no_vote() {
    let transport = Arc::new(LocalTransport::new());
    let p1 = Node::start("p1", &transport);

    let ledger = Arc::new(Ledger::default());
    let log = Arc::new(UnreliableLog::default());
    log.failing.store(true, Ordering::SeqCst);
    transport.register_participant(Arc::new(Participant::new(
        "p2".into(),
        log,
        ledger.clone(),
    )));

    let coordinator = coordinator(
        Arc::new(MemoryTransactionLog::new()),
        transport.clone(),
        &transport,
    );
    let outcome = coordinator
        .begin(
            [p1.id.clone(), ProcessId::from("p2")].into_iter().collect(),
            BTreeMap::new(),
            Duration::from_secs(2),
        )
        .unwrap();

    assert_eq!(outcome.outcome(), Outcome::Aborted);
    // p2 prepared, could not log it, and released what it prepared.
    assert_eq!(ledger.prepares(), 1);
    assert_eq!(ledger.aborts(), 1);
    assert_eq!(ledger.commits(), 0);
}

#[cfg(feature = "file-log")]
#[test]
fn coordinator_recovers_from_file_log_after_restart() {
    use concord::transaction_log::FileTransactionLog;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coordinator.log");

    let transport = Arc::new(LocalTransport::new());
    let p1 = Node::start("p1", &transport);
    let p2 = Node::start("p2", &transport);

    let tx = {
        let lossy = Arc::new(FaultyTransport::new(transport.clone()).losing_decisions_to(&p2.id));
        let first = coordinator(
            Arc::new(FileTransactionLog::open(&path).unwrap()),
            lossy,
            &transport,
        );
        let outcome = begin(&first, &[&p1, &p2]);
        assert!(!outcome.fully_acknowledged());
        *outcome.transaction_id()
    };

    let restarted = coordinator(
        Arc::new(FileTransactionLog::open(&path).unwrap()),
        transport.clone(),
        &transport,
    );
    let report = RecoveryManager::new(transport.clone())
        .recover_coordinator(&restarted)
        .unwrap();

    assert_eq!(report.completed(), &[tx]);
    assert_eq!(p2.ledger.commits(), 1);
    assert_eq!(
        restarted.query_state(&tx).unwrap().map(|t| t.decision()),
        Some(Some(Decision::Commit))
    );
}
