// Copyright 2024 FastLabs Developers
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

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;

use crate::buffered::dispatch::Dispatcher;
use crate::buffered::state::Batch;
use crate::buffered::state::Shared;

pub(crate) struct Worker {
    receiver: Receiver<Batch>,
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    interval: Option<Duration>,
}

impl Worker {
    pub(crate) fn new(
        receiver: Receiver<Batch>,
        shared: Arc<Shared>,
        dispatcher: Dispatcher,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            receiver,
            shared,
            dispatcher,
            interval,
        }
    }

    pub(crate) fn run(self) {
        let Self {
            receiver,
            shared,
            mut dispatcher,
            interval,
        } = self;

        let mut deadline = interval.map(|interval| Instant::now() + interval);
        loop {
            let received = match deadline {
                Some(deadline) => receiver.recv_deadline(deadline),
                None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Batch { events, done }) => {
                    if !events.is_empty() {
                        dispatcher.dispatch(&events);
                    }
                    shared.delivered(events.len());
                    drop(events);
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    // the timed batch goes through the queue to keep batch order
                    shared.tick();
                    deadline = interval.map(|interval| Instant::now() + interval);
                }
                // all senders dropped and every queued batch delivered
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}
