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

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::error::TransportError;
use crate::process::ProcessId;

type Reply<T> = (ProcessId, Result<T, TransportError>);

/// Runs one call per participant on its own thread and hands back replies as they arrive.
///
/// Replies that arrive after the caller stops listening are dropped with the channel, so an
/// unresponsive participant never holds the caller past its deadline.
pub(crate) struct FanOut<T> {
    receiver: Receiver<Reply<T>>,
    outstanding: usize,
}

impl<T> FanOut<T>
where
    T: Send + 'static,
{
    pub fn spawn<I, F>(targets: I, call: F) -> Self
    where
        I: IntoIterator<Item = ProcessId>,
        F: Fn(&ProcessId) -> Result<T, TransportError> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let (sender, receiver) = mpsc::channel();
        let mut outstanding = 0;

        for target in targets {
            outstanding += 1;
            let call = Arc::clone(&call);
            let thread_sender = sender.clone();
            let thread_target = target.clone();

            let spawned = thread::Builder::new()
                .name(format!("concord-{}", target))
                .spawn(move || {
                    let reply = call(&thread_target);
                    // The receiver is gone once the caller's deadline passed.
                    let _ = thread_sender.send((thread_target, reply));
                });

            if let Err(err) = spawned {
                let _ = sender.send((
                    target,
                    Err(TransportError::Internal(format!(
                        "unable to spawn delivery thread: {}",
                        err
                    ))),
                ));
            }
        }

        FanOut {
            receiver,
            outstanding,
        }
    }

    /// The next reply, or `None` once every reply arrived or `until` passed.
    pub fn next(&mut self, until: Instant) -> Option<Reply<T>> {
        if self.outstanding == 0 {
            return None;
        }

        let wait = until.saturating_duration_since(Instant::now());
        match self.receiver.recv_timeout(wait) {
            Ok(reply) => {
                self.outstanding -= 1;
                Some(reply)
            }
            Err(_) => None,
        }
    }

    /// The number of targets that have not replied.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn collects_replies_in_parallel() {
        let targets: Vec<ProcessId> = (0..4).map(|i| ProcessId::new(format!("p{}", i))).collect();
        let started = Instant::now();

        let mut fan_out = FanOut::spawn(targets, |target| {
            thread::sleep(Duration::from_millis(100));
            Ok(target.to_string())
        });

        let mut replies = Vec::new();
        while let Some((_, reply)) = fan_out.next(started + Duration::from_secs(5)) {
            replies.push(reply.unwrap());
        }
        replies.sort();

        assert_eq!(replies, vec!["p0", "p1", "p2", "p3"]);
        // Four sequential calls would take at least 400ms.
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[test]
    fn stops_at_deadline() {
        let mut fan_out = FanOut::spawn(vec![ProcessId::from("fast"), "slow".into()], |target| {
            if target.as_str() == "slow" {
                thread::sleep(Duration::from_millis(500));
            }
            Ok(())
        });

        let until = Instant::now() + Duration::from_millis(100);
        let (first, reply) = fan_out.next(until).unwrap();
        assert_eq!(first, ProcessId::from("fast"));
        assert!(reply.is_ok());
        assert!(fan_out.next(until).is_none());
        assert_eq!(fan_out.outstanding(), 1);
    }
}
