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

//! Contains TransportError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use crate::process::ProcessId;

/// An error raised while delivering a message to another process.
///
/// The protocol treats every variant the same way: during prepare it is an implicit NO vote, and
/// during decision delivery the message is retried. Transport errors cross thread boundaries
/// during fan-out, so they carry plain messages rather than boxed sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote process could not be reached.
    Unreachable(ProcessId),

    /// The remote process was reached but failed to handle the message.
    Remote(ProcessId, String),

    /// The transport itself failed.
    Internal(String),
}

impl Error for TransportError {}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            TransportError::Unreachable(process) => write!(f, "{} is unreachable", process),
            TransportError::Remote(process, msg) => {
                write!(f, "{} failed to handle message: {}", process, msg)
            }
            TransportError::Internal(msg) => write!(f, "transport failure: {}", msg),
        }
    }
}
