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

use std::fmt;

use serde::{Deserialize, Serialize};

/// A participant's answer to PREPARE.
///
/// A `Yes` vote is a binding promise: the participant has durably prepared and will honor a later
/// COMMIT, even across a restart.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vote {
    Yes,
    No,
}

/// The coordinator's single, immutable determination for a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Commit,
    Abort,
}

impl Decision {
    /// Applies the decision rule to a complete or partial set of votes.
    ///
    /// `expected` is the number of participants. Returns `None` while the outcome still depends on
    /// votes that have not arrived.
    pub fn from_votes<'a, I>(votes: I, expected: usize) -> Option<Decision>
    where
        I: IntoIterator<Item = &'a Vote>,
    {
        let mut yes = 0;
        for vote in votes {
            match vote {
                Vote::Yes => yes += 1,
                Vote::No => return Some(Decision::Abort),
            }
        }

        if yes == expected {
            Some(Decision::Commit)
        } else {
            None
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Decision::Commit => f.write_str("COMMIT"),
            Decision::Abort => f.write_str("ABORT"),
        }
    }
}

/// The final, user-visible result of a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Committed,
    Aborted,
}

impl From<Decision> for Outcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => Outcome::Committed,
            Decision::Abort => Outcome::Aborted,
        }
    }
}
