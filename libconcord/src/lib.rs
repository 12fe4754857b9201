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

//! A durable Two-Phase Commit engine.
//!
//! The crate is organized around four components:
//!
//! - [`transaction_log`]: the append-only, crash-durable record of every state transition.
//! - [`two_phase_commit::Coordinator`]: drives voting and issues the binding decision.
//! - [`two_phase_commit::Participant`]: votes on behalf of a local [`ResourceManager`] and enacts
//!   the decision.
//! - [`recovery::RecoveryManager`]: resumes in-flight transactions after a restart by replaying
//!   the log.
//!
//! Processes reach each other through a [`links::Transport`]; [`links::LocalTransport`] wires
//! them together in-process.
//!
//! [`ResourceManager`]: two_phase_commit::ResourceManager

pub mod error;
pub mod links;
mod process;
pub mod recovery;
mod time;
pub mod transaction_log;
pub mod two_phase_commit;

pub use process::ProcessId;
pub use time::{SystemTimeFactory, TimeSource};
