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

//! The Two-Phase Commit protocol: coordinator, participant and the records they keep.
//!
//! The protocol follows the centralized 2PC described in Bernstein, Hadzilacos, and Goodman,
//! Concurrency Control and Recovery in Database Systems, 7.4, with presumed abort: a coordinator
//! with no record of a transaction answers ABORT.

mod coordinator;
mod coordinator_config;
mod coordinator_state;
mod fan_out;
mod message;
mod operation;
mod participant;
mod participant_record;
mod participant_state;
mod resource_manager;
mod transaction;
mod transaction_id;
mod unified_state;
mod vote;

pub use coordinator::{CommitOutcome, Coordinator};
pub use coordinator_config::{CoordinatorConfig, CoordinatorConfigBuilder, RetryPolicy};
pub use coordinator_state::CoordinatorState;
pub use message::{DecisionMessage, PrepareMessage};
pub use operation::{Operation, PreparedPayload};
pub use participant::Participant;
pub use participant_record::ParticipantLocalRecord;
pub use participant_state::ParticipantState;
pub use resource_manager::ResourceManager;
pub use transaction::Transaction;
pub use transaction_id::TransactionId;
pub use unified_state::TwoPhaseCommitState;
pub use vote::{Decision, Outcome, Vote};
