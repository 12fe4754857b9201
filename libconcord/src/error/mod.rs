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

//! Errors raised by the transaction log, the transport and the protocol engine.
//!
//! The general purpose errors come from `errling`; the component errors in this module wrap them
//! so callers can tell a durability failure from a protocol violation.

mod commit;
mod recovery;
mod transaction_log;
mod transport;

pub use errling::{InternalError, InvalidStateError};

pub use commit::CommitError;
pub use recovery::RecoveryError;
pub use transaction_log::LogError;
pub use transport::TransportError;
