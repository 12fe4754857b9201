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

//! Contains CommitError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use super::InternalError;
use super::InvalidStateError;
use super::LogError;

/// An error which can occur while a coordinator or participant processes a protocol step.
#[derive(Debug)]
pub enum CommitError {
    /// The request was malformed, for example a transaction without participants.
    InvalidRequest(String),

    /// The step conflicts with the transaction's current state.
    InvalidState(InvalidStateError),

    /// The step could not be made durable; it must be treated as not having happened.
    Log(LogError),

    /// The step failed due to an unexpected internal error, such as a resource manager failure.
    Internal(InternalError),
}

impl Error for CommitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommitError::InvalidRequest(_) => None,
            CommitError::InvalidState(e) => Some(e),
            CommitError::Log(e) => Some(e),
            CommitError::Internal(e) => Some(e),
        }
    }
}

impl Display for CommitError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            CommitError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            CommitError::InvalidState(e) => write!(f, "{}", e),
            CommitError::Log(e) => write!(f, "{}", e),
            CommitError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<InvalidStateError> for CommitError {
    fn from(err: InvalidStateError) -> Self {
        CommitError::InvalidState(err)
    }
}

impl From<LogError> for CommitError {
    fn from(err: LogError) -> Self {
        CommitError::Log(err)
    }
}

impl From<InternalError> for CommitError {
    fn from(err: InternalError) -> Self {
        CommitError::Internal(err)
    }
}
