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

//! Messages exchanged between the coordinator and participants.
//!
//! The engine does not mandate a wire format; these types define the payload any transport must
//! carry and serialize to JSON as:
//!
//! ```text
//! PREPARE  { "transaction_id": "...", "coordinator": "...",
//!            "operations": [ {"type": "...", "resource": "...", "data": {...}} ] }
//! DECISION { "transaction_id": "...", "decision": "COMMIT" | "ABORT" }
//! ```

use serde::{Deserialize, Serialize};

use crate::process::ProcessId;

use super::Decision;
use super::Operation;
use super::TransactionId;

/// Asks a participant to vote on a transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrepareMessage {
    pub transaction_id: TransactionId,
    pub coordinator: ProcessId,
    pub operations: Vec<Operation>,
}

impl PrepareMessage {
    pub fn new(
        transaction_id: TransactionId,
        coordinator: ProcessId,
        operations: Vec<Operation>,
    ) -> Self {
        PrepareMessage {
            transaction_id,
            coordinator,
            operations,
        }
    }
}

/// Delivers the coordinator's decision. Resending it is always safe.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DecisionMessage {
    pub transaction_id: TransactionId,
    pub decision: Decision,
}

impl DecisionMessage {
    pub fn new(transaction_id: TransactionId, decision: Decision) -> Self {
        DecisionMessage {
            transaction_id,
            decision,
        }
    }
}
