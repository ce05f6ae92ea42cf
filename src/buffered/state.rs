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

use std::mem;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::SendTimeoutError;
use crossbeam_channel::Sender;

use crate::Error;
use crate::ErrorKind;
use crate::envelope::Envelope;
use crate::envelope::Level;

pub(crate) struct Batch {
    pub(crate) events: Vec<Envelope>,
    pub(crate) done: Option<oneshot::Sender<()>>,
}

pub(crate) enum HandOff {
    /// The event was buffered and no flush was due.
    Buffered,
    /// A batch was queued; the receiver fires once it has been delivered.
    Queued(Option<oneshot::Receiver<()>>),
    /// The worker queue stayed full; the batch was dropped.
    Dropped(Error),
}

/// A snapshot of the buffer waiting for its turn to enter the worker queue.
///
/// Tickets are numbered in snapshot order and enter the queue in that order.
struct Ticket {
    number: u64,
    events: Vec<Envelope>,
    sender: Sender<Batch>,
}

#[derive(Debug)]
struct Buffer {
    events: Vec<Envelope>,
    // None once the engine is shut down
    sender: Option<Sender<Batch>>,
    // number of the next ticket
    issued: u64,
}

impl Buffer {
    fn take(&mut self, capacity: usize) -> Option<Ticket> {
        let sender = self.sender.clone()?;
        let number = self.issued;
        self.issued += 1;
        let events = mem::replace(&mut self.events, Vec::with_capacity(capacity));
        Some(Ticket {
            number,
            events,
            sender,
        })
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    buffer: Mutex<Buffer>,
    // number of the ticket allowed to enter the worker queue
    serving: Mutex<u64>,
    turn: Condvar,
    pending: AtomicUsize,
    buffer_size: usize,
    flush_level: Option<Level>,
    send_timeout: Duration,
}

impl Shared {
    pub(crate) fn new(
        sender: Sender<Batch>,
        buffer_size: usize,
        flush_level: Option<Level>,
        send_timeout: Duration,
    ) -> Self {
        Shared {
            buffer: Mutex::new(Buffer {
                events: Vec::with_capacity(buffer_size),
                sender: Some(sender),
                issued: 0,
            }),
            serving: Mutex::new(0),
            turn: Condvar::new(),
            pending: AtomicUsize::new(0),
            buffer_size,
            flush_level,
            send_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // the buffer holds no invariant a panicking holder could break
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_serving(&self) -> MutexGuard<'_, u64> {
        self.serving.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of events waiting in the buffer.
    pub(crate) fn buffered(&self) -> usize {
        self.lock().events.len()
    }

    /// Number of events handed to the worker and not yet delivered.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn delivered(&self, count: usize) {
        self.pending.fetch_sub(count, Ordering::AcqRel);
    }

    pub(crate) fn append(&self, envelope: Envelope, wait: bool) -> Result<HandOff, Error> {
        let ticket = {
            let mut buffer = self.lock();
            if buffer.sender.is_none() {
                return Err(closed());
            }

            let urgent = self
                .flush_level
                .is_some_and(|level| envelope.level() >= level);
            buffer.events.push(envelope);
            if !urgent && buffer.events.len() < self.buffer_size {
                return Ok(HandOff::Buffered);
            }
            buffer.take(self.buffer_size).ok_or_else(closed)?
        };
        Ok(self.hand_off(ticket, wait))
    }

    /// Queue whatever is buffered, even nothing, and return a completion signal.
    ///
    /// An empty batch makes no sink calls; it only waits for earlier batches.
    pub(crate) fn flush(&self) -> Result<HandOff, Error> {
        let ticket = self.lock().take(self.buffer_size).ok_or_else(closed)?;
        Ok(self.hand_off(ticket, true))
    }

    /// Queue the final batch and disconnect the worker.
    ///
    /// Returns `None` if the engine was already closed.
    pub(crate) fn close(&self) -> Option<HandOff> {
        let ticket = {
            let mut buffer = self.lock();
            let ticket = buffer.take(self.buffer_size)?;
            buffer.sender = None;
            ticket
        };
        // the worker disconnects once the final ticket drops its sender
        Some(self.hand_off(ticket, true))
    }

    /// Queue a time-triggered batch from the worker thread.
    ///
    /// Never blocks: if the worker queue is full, or a hand-off is still
    /// waiting for room, the events stay buffered.
    pub(crate) fn tick(&self) {
        let mut guard = self.lock();
        let buffer = &mut *guard;
        let Some(sender) = buffer.sender.as_ref() else {
            return;
        };
        if buffer.events.is_empty() || sender.is_full() {
            return;
        }

        // no ticket can be issued while the buffer is locked
        let serving = self.lock_serving();
        if *serving != buffer.issued {
            return;
        }

        let events = mem::replace(&mut buffer.events, Vec::with_capacity(self.buffer_size));
        let count = events.len();
        self.pending.fetch_add(count, Ordering::AcqRel);
        if let Err(err) = sender.try_send(Batch { events, done: None }) {
            self.pending.fetch_sub(count, Ordering::AcqRel);
            buffer.events = err.into_inner().events;
        }
        drop(serving);
    }

    fn hand_off(&self, ticket: Ticket, wait: bool) -> HandOff {
        let Ticket {
            number,
            events,
            sender,
        } = ticket;

        let count = events.len();
        let (done, receiver) = if wait {
            let (done, receiver) = oneshot::channel();
            (Some(done), Some(receiver))
        } else {
            (None, None)
        };

        let _turn = self.wait_turn(number);
        self.pending.fetch_add(count, Ordering::AcqRel);
        match sender.send_timeout(Batch { events, done }, self.send_timeout) {
            Ok(()) => HandOff::Queued(receiver),
            Err(err) => {
                self.pending.fetch_sub(count, Ordering::AcqRel);
                let reason = match err {
                    SendTimeoutError::Timeout(_) => "flush queue stayed full",
                    SendTimeoutError::Disconnected(_) => "flush worker is gone",
                };
                HandOff::Dropped(
                    Error::sink("dropped a batch without delivery")
                        .with_context("reason", reason)
                        .with_context("events", count),
                )
            }
        }
    }

    fn wait_turn(&self, number: u64) -> Turn<'_> {
        let mut serving = self.lock_serving();
        while *serving != number {
            serving = self
                .turn
                .wait(serving)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Turn { shared: self }
    }
}

// passes the turn to the next ticket when dropped
struct Turn<'a> {
    shared: &'a Shared,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        *self.shared.lock_serving() += 1;
        self.shared.turn.notify_all();
    }
}

fn closed() -> Error {
    Error::new(ErrorKind::Closed, "buffered appender is shut down")
}
