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

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use jiff::Timestamp;
use logforth_buffered::Error;
use logforth_buffered::ErrorKind;
use logforth_buffered::Layout;
use logforth_buffered::Sink;
use logforth_buffered::Trap;
use logforth_buffered::config::Config;
use logforth_buffered::envelope::Envelope;
use logforth_buffered::envelope::Level;
use logforth_buffered::sink::Payload;

pub fn config(buffer_size: usize) -> Config {
    Config::new("UseDevelopmentStorage=true", "testLoggingTable").buffer_size(buffer_size)
}

/// An envelope with a timestamp that increases with `n`.
pub fn envelope(message: impl Into<String>, n: i64) -> Envelope {
    Envelope::builder(message)
        .timestamp(Timestamp::from_millisecond(1_700_000_000_000 + n).unwrap())
        .level(Level::Critical)
        .logger_name("testLoggerName")
        .thread_name("testThreadName")
        .domain("testDomain")
        .identity("testIdentity")
        .user_name("testUsername")
        .build()
}

pub fn messages(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{prefix}{i}")).collect()
}

/// Renders the message only and remembers every render call.
#[derive(Debug, Clone, Default)]
pub struct MessageLayout {
    pub rendered: Arc<Mutex<Vec<String>>>,
    pub fail_on: Option<String>,
    pub panic_on: Option<String>,
}

impl MessageLayout {
    pub fn failing_on(message: &str) -> Self {
        MessageLayout {
            fail_on: Some(message.to_string()),
            ..MessageLayout::default()
        }
    }

    pub fn panicking_on(message: &str) -> Self {
        MessageLayout {
            panic_on: Some(message.to_string()),
            ..MessageLayout::default()
        }
    }

    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

impl Layout for MessageLayout {
    fn format(&self, envelope: &Envelope) -> Result<Vec<u8>, Error> {
        let message = envelope.message().to_string();
        self.rendered.lock().unwrap().push(message.clone());
        if self.panic_on.as_ref() == Some(&message) {
            panic!("layout exploded on {message}");
        }
        if self.fail_on.as_ref() == Some(&message) {
            return Err(Error::new(ErrorKind::Render, "cannot render"));
        }
        Ok(message.into_bytes())
    }
}

/// Shared record of what a test sink saw.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub batches: Arc<Mutex<Vec<Vec<String>>>>,
    pub puts: Arc<Mutex<Vec<String>>>,
    pub ensured: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn ensured(&self) -> usize {
        self.ensured.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Poll until at least `n` batches were recorded.
    pub fn wait_for_batches(&self, n: usize, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.batches.lock().unwrap().len() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

/// A batch-capable sink that records one entry per flush.
#[derive(Debug, Default)]
pub struct BatchSink {
    pub recorder: Recorder,
    pub failing: Vec<String>,
}

impl BatchSink {
    pub fn new(recorder: &Recorder) -> Self {
        BatchSink {
            recorder: recorder.clone(),
            failing: vec![],
        }
    }

    pub fn failing_on(mut self, message: &str) -> Self {
        self.failing.push(message.to_string());
        self
    }
}

impl Sink for BatchSink {
    fn ensure_exists(&self) -> Result<(), Error> {
        self.recorder.ensured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn put(&self, _: &Payload) -> Result<(), Error> {
        unreachable!("batch sinks receive whole flushes")
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn put_batch(&self, payloads: &[Payload]) -> Vec<Result<(), Error>> {
        let bodies = payloads
            .iter()
            .map(|p| p.body_str().into_owned())
            .collect::<Vec<_>>();
        let results = bodies
            .iter()
            .map(|body| {
                if self.failing.contains(body) {
                    Err(Error::sink("rejected"))
                } else {
                    Ok(())
                }
            })
            .collect();
        self.recorder.batches.lock().unwrap().push(bodies);
        results
    }
}

/// A sink delivering one payload per call.
#[derive(Debug, Default)]
pub struct EventSink {
    pub recorder: Recorder,
    pub failing: Vec<String>,
    pub fail_all: bool,
    pub panic_on: Option<String>,
    pub delay: Option<Duration>,
    pub gate: Option<Mutex<std::sync::mpsc::Receiver<()>>>,
}

impl EventSink {
    pub fn new(recorder: &Recorder) -> Self {
        EventSink {
            recorder: recorder.clone(),
            ..EventSink::default()
        }
    }
}

impl Sink for EventSink {
    fn ensure_exists(&self) -> Result<(), Error> {
        self.recorder.ensured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn put(&self, payload: &Payload) -> Result<(), Error> {
        let body = payload.body_str().into_owned();
        self.recorder.puts.lock().unwrap().push(body.clone());

        let in_flight = self.recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            // blocks until the test drops the sender
            let _ = gate.lock().unwrap().recv();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.recorder.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.as_ref() == Some(&body) {
            panic!("sink exploded on {body}");
        }
        if self.fail_all || self.failing.contains(&body) {
            return Err(Error::sink("network unreachable"));
        }
        Ok(())
    }
}

/// Collects every trapped error.
#[derive(Debug, Clone, Default)]
pub struct CollectTrap {
    pub errors: Arc<Mutex<Vec<Trapped>>>,
}

#[derive(Debug, Clone)]
pub struct Trapped {
    pub kind: ErrorKind,
    pub message: String,
    pub sequence: Option<String>,
    pub pending: Option<String>,
    pub display: String,
}

impl CollectTrap {
    pub fn errors(&self) -> Vec<Trapped> {
        self.errors.lock().unwrap().clone()
    }
}

impl Trap for CollectTrap {
    fn trap(&self, err: &Error) {
        self.errors.lock().unwrap().push(Trapped {
            kind: err.kind(),
            message: err.message().to_string(),
            sequence: err.context_value("sequence").map(str::to_string),
            pending: err.context_value("pending_events").map(str::to_string),
            display: err.to_string(),
        });
    }
}
