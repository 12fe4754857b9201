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

use serde::{Deserialize, Serialize};

/// A unit of work a participant is asked to apply as part of a transaction.
///
/// The engine never interprets operations; they are handed to the participant's
/// [`ResourceManager`](super::ResourceManager) as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: String,
    pub resource: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Operation {
    pub fn new<K, R>(kind: K, resource: R, data: serde_json::Value) -> Self
    where
        K: Into<String>,
        R: Into<String>,
    {
        Operation {
            kind: kind.into(),
            resource: resource.into(),
            data,
        }
    }
}

/// Resource-manager-specific data produced by `prepare`, sufficient to later commit or abort
/// without re-deriving anything. It is logged verbatim and never inspected by the engine.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreparedPayload(Vec<u8>);

impl PreparedPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        PreparedPayload(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for PreparedPayload {
    fn from(bytes: Vec<u8>) -> Self {
        PreparedPayload(bytes)
    }
}
