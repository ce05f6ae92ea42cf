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

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::Error;
use crate::ErrorKind;
use crate::Layout;
use crate::Trap;
use crate::envelope::Envelope;
use crate::sink::Payload;
use crate::sink::Sink;

/// Renders a batch and delivers it to the sink, reporting every failure.
pub(crate) struct Dispatcher {
    layout: Box<dyn Layout>,
    sink: Box<dyn Sink>,
    trap: Arc<dyn Trap>,
    destination: String,
    thread_name: String,
    max_concurrency: usize,
    next_sequence: u64,
}

impl Dispatcher {
    pub(crate) fn new(
        layout: Box<dyn Layout>,
        sink: Box<dyn Sink>,
        trap: Arc<dyn Trap>,
        destination: String,
        thread_name: String,
        max_concurrency: usize,
    ) -> Self {
        Dispatcher {
            layout,
            sink,
            trap,
            destination,
            thread_name,
            max_concurrency,
            next_sequence: 0,
        }
    }

    /// Deliver one batch. Nothing raised while delivering escapes to the worker.
    pub(crate) fn dispatch(&mut self, events: &[Envelope]) {
        if catch_unwind(AssertUnwindSafe(|| self.deliver(events))).is_err() {
            let err = Error::new(ErrorKind::Unexpected, "flush panicked")
                .with_context("destination", &self.destination)
                .with_context("events", events.len());
            self.trap.trap(&err);
        }
    }

    fn deliver(&mut self, events: &[Envelope]) {
        let mut payloads = Vec::with_capacity(events.len());
        for envelope in events {
            let sequence = self.next_sequence;
            self.next_sequence += 1;

            let rendered = catch_unwind(AssertUnwindSafe(|| self.layout.format(envelope)))
                .unwrap_or_else(|_| Err(Error::new(ErrorKind::Render, "layout panicked")));
            match rendered {
                Ok(body) => payloads.push(Payload::new(envelope, sequence, body)),
                Err(err) => {
                    let err = Error::new(ErrorKind::Render, "failed to render event")
                        .with_context("destination", &self.destination)
                        .with_context("sequence", sequence)
                        .with_source(err);
                    self.trap.trap(&err);
                }
            }
        }

        if payloads.is_empty() {
            return;
        }

        if self.sink.supports_batch() {
            self.put_batch(&payloads);
        } else {
            self.fan_out(&payloads);
        }
    }

    fn put_batch(&self, payloads: &[Payload]) {
        let results = match catch_unwind(AssertUnwindSafe(|| self.sink.put_batch(payloads))) {
            Ok(results) => results,
            Err(_) => {
                let err = Error::sink("sink panicked while delivering a batch")
                    .with_context("destination", &self.destination)
                    .with_context("events", payloads.len());
                self.trap.trap(&err);
                return;
            }
        };

        if results.len() != payloads.len() {
            let err = Error::sink("sink returned a result count different from the batch size")
                .with_context("destination", &self.destination)
                .with_context("events", payloads.len())
                .with_context("results", results.len());
            self.trap.trap(&err);
        }

        for (payload, result) in payloads.iter().zip(results) {
            if let Err(err) = result {
                self.report(payload, err);
            }
        }
    }

    // at most max_concurrency sink calls are in flight, the current thread included
    fn fan_out(&self, payloads: &[Payload]) {
        let workers = self.max_concurrency.min(payloads.len());
        if workers <= 1 {
            payloads.iter().for_each(|payload| self.put(payload));
            return;
        }

        let next = AtomicUsize::new(0);
        let work = || {
            while let Some(payload) = payloads.get(next.fetch_add(1, Ordering::Relaxed)) {
                self.put(payload);
            }
        };

        std::thread::scope(|scope| {
            for i in 1..workers {
                let spawned = std::thread::Builder::new()
                    .name(format!("{}-{i}", self.thread_name))
                    .spawn_scoped(scope, &work);
                if let Err(err) = spawned {
                    let err = Error::new(ErrorKind::Unexpected, "failed to spawn flush thread")
                        .with_context("destination", &self.destination)
                        .with_source(err);
                    self.trap.trap(&err);
                    break;
                }
            }
            work();
        });
    }

    fn put(&self, payload: &Payload) {
        match catch_unwind(AssertUnwindSafe(|| self.sink.put(payload))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.report(payload, err),
            Err(_) => self.report(payload, Error::sink("sink panicked")),
        }
    }

    fn report(&self, payload: &Payload, err: Error) {
        let err = Error::sink("failed to deliver event")
            .with_context("destination", &self.destination)
            .with_context("sequence", payload.sequence())
            .with_source(err);
        self.trap.trap(&err);
    }
}
