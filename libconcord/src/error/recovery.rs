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

//! Contains RecoveryError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use super::CommitError;
use super::InvalidStateError;
use super::LogError;

/// A fatal error raised while recovering a node.
///
/// A node that fails to recover must not accept new transactions: its in-memory state can not be
/// reconciled with the log.
#[derive(Debug)]
pub enum RecoveryError {
    /// The log could not be read, or it is corrupt.
    Log(LogError),

    /// The log was readable but its entries describe an impossible transaction history.
    Inconsistent(InvalidStateError),

    /// Resuming a transaction failed in a way that leaves the log unusable, such as a failed
    /// append of the recovered decision.
    Commit(CommitError),
}

impl Error for RecoveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RecoveryError::Log(e) => Some(e),
            RecoveryError::Inconsistent(e) => Some(e),
            RecoveryError::Commit(e) => Some(e),
        }
    }
}

impl Display for RecoveryError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            RecoveryError::Log(e) => write!(f, "recovery failed: {}", e),
            RecoveryError::Inconsistent(e) => write!(f, "recovery failed: {}", e),
            RecoveryError::Commit(e) => write!(f, "recovery failed: {}", e),
        }
    }
}

impl From<LogError> for RecoveryError {
    fn from(err: LogError) -> Self {
        RecoveryError::Log(err)
    }
}

impl From<InvalidStateError> for RecoveryError {
    fn from(err: InvalidStateError) -> Self {
        RecoveryError::Inconsistent(err)
    }
}

impl From<CommitError> for RecoveryError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Log(e) => RecoveryError::Log(e),
            CommitError::InvalidState(e) => RecoveryError::Inconsistent(e),
            other => RecoveryError::Commit(other),
        }
    }
}
