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

//! Defines how coordinators and participants reach each other.
//!
//! The protocol only needs request/response delivery between two processes, each uniquely
//! identified by a [`ProcessId`]. A [`Transport`] provides that delivery; it may be backed by
//! RPC, a message queue, or, with [`LocalTransport`], direct calls within one process.
//!
//! A transport is not expected to be reliable. Any [`TransportError`] is treated by the protocol
//! as "no answer": an implicit NO vote during prepare, and a reason to resend during decision
//! delivery.

mod local;

use crate::error::TransportError;
use crate::process::ProcessId;
use crate::two_phase_commit::{Decision, DecisionMessage, PrepareMessage, TransactionId, Vote};

pub use local::LocalTransport;

/// Delivers protocol messages to a remote process and returns its answer.
///
/// Calls block until the answer arrives or the transport gives up. The coordinator runs calls to
/// different participants on separate threads and stops waiting at its own deadline, so an
/// implementation does not need timeouts of its own to keep the protocol live.
pub trait Transport: Send + Sync {
    /// Asks `participant` to vote.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] is returned if the message could not be delivered or the participant
    /// failed to handle it.
    fn send_prepare(
        &self,
        participant: &ProcessId,
        message: &PrepareMessage,
    ) -> Result<Vote, TransportError>;

    /// Delivers the decision. `Ok` is the participant's acknowledgement.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] is returned if the message could not be delivered or the participant
    /// failed to apply the decision.
    fn send_decision(
        &self,
        participant: &ProcessId,
        message: &DecisionMessage,
    ) -> Result<(), TransportError>;

    /// Asks `participant` for the vote it logged, without asking it to vote.
    fn query_vote(
        &self,
        participant: &ProcessId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Vote>, TransportError>;

    /// Asks `coordinator` for the decision on a transaction.
    fn query_decision(
        &self,
        coordinator: &ProcessId,
        transaction_id: &TransactionId,
    ) -> Result<Option<Decision>, TransportError>;
}
