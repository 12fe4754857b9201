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

//! Contains LogError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use super::InternalError;
use super::InvalidStateError;

/// An error raised by a [`TransactionLog`](crate::transaction_log::TransactionLog).
///
/// Any `LogError` returned from `append` means the entry is not durable and the protocol step
/// that produced it has not happened.
#[derive(Debug)]
pub enum LogError {
    /// The backing store failed to read or durably write.
    Internal(InternalError),

    /// The stored entries can not be trusted; a node must not process transactions against it.
    Corrupt(InvalidStateError),
}

impl LogError {
    pub fn corrupt(message: String) -> Self {
        LogError::Corrupt(InvalidStateError::with_message(message))
    }
}

impl Error for LogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LogError::Internal(e) => Some(e),
            LogError::Corrupt(e) => Some(e),
        }
    }
}

impl Display for LogError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            LogError::Internal(e) => write!(f, "transaction log failure: {}", e),
            LogError::Corrupt(e) => write!(f, "transaction log corrupt: {}", e),
        }
    }
}

impl From<InternalError> for LogError {
    fn from(err: InternalError) -> Self {
        LogError::Internal(err)
    }
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        LogError::Internal(InternalError::from_source(Box::new(err)))
    }
}
