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

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LogError;
use crate::process::ProcessId;
use crate::two_phase_commit::TransactionId;

use super::{incomplete_entries, LogEntry, TransactionLog};

/// An in-memory [`TransactionLog`].
///
/// Clones share the same entries, so a log handed to a coordinator or participant outlives that
/// process being dropped. This is how tests and embedded deployments model a crash and restart.
#[derive(Clone, Default)]
pub struct MemoryTransactionLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every entry, in append order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl TransactionLog for MemoryTransactionLog {
    fn append(&self, entry: LogEntry) -> Result<(), LogError> {
        self.entries.lock().push(entry);
        Ok(())
    }

    fn scan_incomplete(&self, actor: &ProcessId) -> Result<Vec<LogEntry>, LogError> {
        Ok(incomplete_entries(self.entries.lock().iter(), actor))
    }

    fn load(&self, transaction_id: &TransactionId) -> Result<Vec<LogEntry>, LogError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.transaction_id() == transaction_id)
            .cloned()
            .collect())
    }
}
