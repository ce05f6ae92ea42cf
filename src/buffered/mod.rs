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

//! The buffering engine.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::Error;
use crate::ErrorKind;
use crate::Layout;
use crate::Trap;
use crate::bridge::Process;
use crate::config::Config;
use crate::config::Destination;
use crate::config::FlushMode;
use crate::envelope::Envelope;
use crate::envelope::Level;
use crate::layout::PlainTextLayout;
use crate::sink::Sink;
use crate::trap::DefaultTrap;

mod dispatch;
mod state;
mod worker;

use self::dispatch::Dispatcher;
use self::state::HandOff;
use self::state::Shared;
use self::worker::Worker;

/// An appender that buffers envelopes in memory and flushes them to a [`Sink`].
///
/// A flush is triggered when the buffer reaches `buffer_size`, when an event
/// at or above `flush_level` arrives, when `flush_interval` elapses, on
/// [`Buffered::flush`] and on [`Buffered::shutdown`]. Each flush takes the
/// whole buffer, so every event is delivered by exactly one flush.
///
/// Delivery is attempted once. Failures are reported to the [`Trap`] and never
/// returned to the caller of [`Buffered::append`].
///
/// Dropping the appender shuts it down.
///
/// # Examples
///
/// ```
/// use logforth_buffered::BufferedBuilder;
/// use logforth_buffered::config::Config;
/// use logforth_buffered::envelope::Envelope;
/// use logforth_buffered::sink::Testing;
///
/// let config = Config::new("UseDevelopmentStorage=true", "testLoggingQueue").buffer_size(5);
/// let buffered = BufferedBuilder::new(config)
///     .activate(|_| Ok(Testing::default()))
///     .unwrap();
///
/// buffered.append(Envelope::builder("Hello buffered!").build()).unwrap();
/// buffered.shutdown();
/// ```
#[derive(Debug)]
pub struct Buffered {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) trap: Arc<dyn Trap>,
    mode: FlushMode,
    flush_timeout: Duration,
    pub(crate) threshold: Level,
    pub(crate) process: Process,
}

impl Buffered {
    /// Create a builder for a buffered appender.
    pub fn builder(config: Config) -> BufferedBuilder {
        BufferedBuilder::new(config)
    }

    /// Buffer one envelope, flushing if the buffer is full.
    ///
    /// Returns an error only if the appender has been shut down. In
    /// [`FlushMode::Blocking`], a triggered flush is awaited for at most
    /// `flush_timeout`.
    pub fn append(&self, envelope: Envelope) -> Result<(), Error> {
        let wait = self.mode == FlushMode::Blocking;
        match self.shared.append(envelope, wait)? {
            HandOff::Buffered | HandOff::Queued(None) => {}
            HandOff::Queued(Some(done)) => {
                self.wait(done, "flush");
            }
            HandOff::Dropped(err) => self.trap.trap(&err),
        }
        Ok(())
    }

    /// Flush whatever is buffered and wait for it, and for every earlier
    /// flush, to complete.
    ///
    /// Makes no sink call if nothing is buffered. Waits for at most
    /// `flush_timeout`; a timeout is reported to the trap.
    pub fn flush(&self) -> Result<(), Error> {
        match self.shared.flush()? {
            HandOff::Buffered | HandOff::Queued(None) => {}
            HandOff::Queued(Some(done)) => {
                self.wait(done, "flush");
            }
            HandOff::Dropped(err) => self.trap.trap(&err),
        }
        Ok(())
    }

    /// Flush the remaining events and stop the flush worker.
    ///
    /// Waits for at most `flush_timeout`. If the worker is still busy after
    /// that, the number of undelivered events is reported and the worker is
    /// left to finish on its own. Later calls to [`Buffered::append`] and
    /// [`Buffered::flush`] fail with [`ErrorKind::Closed`].
    ///
    /// Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        let Some(handoff) = self.shared.close() else {
            return;
        };

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let completed = match handoff {
            HandOff::Buffered | HandOff::Queued(None) => false,
            HandOff::Queued(Some(done)) => self.wait(done, "shutdown"),
            HandOff::Dropped(err) => {
                self.trap.trap(&err);
                false
            }
        };

        // an unfinished worker is detached; it exits once its sink calls return
        if let Some(handle) = handle.filter(|_| completed) {
            if handle.join().is_err() {
                let err = Error::new(ErrorKind::Unexpected, "flush worker panicked");
                self.trap.trap(&err);
            }
        }
    }

    /// Number of events buffered and not yet handed to a flush.
    pub fn buffered(&self) -> usize {
        self.shared.buffered()
    }

    // returns whether the flush completed in time
    fn wait(&self, done: oneshot::Receiver<()>, operation: &'static str) -> bool {
        match done.recv_timeout(self.flush_timeout) {
            Ok(()) => true,
            Err(oneshot::RecvTimeoutError::Timeout) => {
                let err = Error::sink(format!("{operation} did not complete in time"))
                    .with_context("timeout", format!("{:?}", self.flush_timeout))
                    .with_context("pending_events", self.shared.pending());
                self.trap.trap(&err);
                false
            }
            Err(oneshot::RecvTimeoutError::Disconnected) => {
                let message = format!("flush worker exited during {operation}");
                let err = Error::new(ErrorKind::Unexpected, message)
                    .with_context("pending_events", self.shared.pending());
                self.trap.trap(&err);
                false
            }
        }
    }
}

impl Drop for Buffered {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A builder for configuring and activating a [`Buffered`] appender.
pub struct BufferedBuilder {
    config: Config,
    layout: Box<dyn Layout>,
    trap: Box<dyn Trap>,
    thread_name: String,
}

impl BufferedBuilder {
    /// Create a new builder from `config`.
    ///
    /// Default to [`PlainTextLayout`] and [`DefaultTrap`].
    pub fn new(config: Config) -> Self {
        BufferedBuilder {
            config,
            layout: Box::new(PlainTextLayout::default()),
            trap: Box::new(DefaultTrap::default()),
            thread_name: "logforth-buffered".to_string(),
        }
    }

    /// Set the layout rendering envelopes into payloads.
    pub fn layout(mut self, layout: impl Into<Box<dyn Layout>>) -> Self {
        self.layout = layout.into();
        self
    }

    /// Set the trap receiving delivery errors.
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Set the name of the flush worker thread.
    ///
    /// Fan-out threads are named after it with a numeric suffix.
    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Validate the config, connect the sink and start the flush worker.
    ///
    /// `connect` resolves the configured connection identifier and destination
    /// name into a sink. The sink's [`Sink::ensure_exists`] is called once
    /// before the appender accepts events.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Configuration`] error if a required setting is
    /// missing or invalid, and any error returned by `connect` or
    /// [`Sink::ensure_exists`].
    pub fn activate<S, F>(self, connect: F) -> Result<Buffered, Error>
    where
        F: FnOnce(&Destination) -> Result<S, Error>,
        S: Into<Box<dyn Sink>>,
    {
        let Self {
            config,
            layout,
            trap,
            thread_name,
        } = self;

        let settings = config.resolve()?;
        let sink: Box<dyn Sink> = connect(&settings.destination)?.into();
        sink.ensure_exists()?;

        let trap: Arc<dyn Trap> = Arc::from(trap);
        let (sender, receiver) = crossbeam_channel::bounded(settings.max_pending_flushes);
        let shared = Arc::new(Shared::new(
            sender,
            settings.buffer_size,
            settings.flush_level,
            settings.flush_timeout,
        ));

        let dispatcher = Dispatcher::new(
            layout,
            sink,
            trap.clone(),
            settings.destination.name().to_string(),
            thread_name.clone(),
            settings.max_concurrency,
        );
        let worker = Worker::new(
            receiver,
            shared.clone(),
            dispatcher,
            settings.flush_interval,
        );
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker.run())
            .map_err(|err| {
                Error::new(ErrorKind::Unexpected, "failed to spawn flush worker thread")
                    .with_source(err)
            })?;

        Ok(Buffered {
            shared,
            worker: Mutex::new(Some(handle)),
            trap,
            mode: settings.mode,
            flush_timeout: settings.flush_timeout,
            threshold: settings.threshold,
            process: Process::capture(),
        })
    }
}
