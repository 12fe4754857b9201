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

//! The append-only, crash-durable transaction log.
//!
//! Every protocol step is appended to the log before the step is acted upon. An `append` that
//! returns an error means the step did not happen; the caller must retry the whole step and never
//! assume partial success.

mod entry;
#[cfg(feature = "file-log")]
mod file;
mod memory;

use std::collections::{HashMap, HashSet};

use crate::error::LogError;
use crate::process::ProcessId;
use crate::two_phase_commit::TransactionId;

pub use entry::{LogEntry, LogPayload};
#[cfg(feature = "file-log")]
pub use file::FileTransactionLog;
pub use memory::MemoryTransactionLog;

/// A durable store of [`LogEntry`] records.
///
/// Any store offering atomic durable append and ordered scan satisfies this trait.
pub trait TransactionLog: Send + Sync {
    /// Appends `entry`. The entry must be durable (fsync or equivalent) before this returns.
    ///
    /// # Errors
    ///
    /// A [`LogError`] is fatal for the calling protocol step.
    fn append(&self, entry: LogEntry) -> Result<(), LogError>;

    /// Returns the entries written by `actor` for every transaction that `actor` has not brought
    /// to a terminal state, in append order.
    fn scan_incomplete(&self, actor: &ProcessId) -> Result<Vec<LogEntry>, LogError>;

    /// Returns all entries for `transaction_id`, from all actors, in append order.
    fn load(&self, transaction_id: &TransactionId) -> Result<Vec<LogEntry>, LogError>;
}

// Shared by the stores that keep an ordered in-memory copy of their entries.
fn incomplete_entries<'a, I>(entries: I, actor: &ProcessId) -> Vec<LogEntry>
where
    I: IntoIterator<Item = &'a LogEntry> + Clone,
{
    let mut latest = HashMap::new();
    for entry in entries.clone().into_iter().filter(|e| e.actor() == actor) {
        latest.insert(*entry.transaction_id(), entry.to_state());
    }

    let incomplete: HashSet<TransactionId> = latest
        .into_iter()
        .filter(|(_, state)| !state.is_terminal())
        .map(|(id, _)| id)
        .collect();

    entries
        .into_iter()
        .filter(|e| e.actor() == actor && incomplete.contains(e.transaction_id()))
        .cloned()
        .collect()
}
