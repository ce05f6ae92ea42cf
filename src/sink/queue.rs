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

use std::fmt;

use crate::Error;
use crate::sink::Payload;
use crate::sink::Sink;

/// The transport behind a [`Queue`] sink.
///
/// Implement this over the message queue client of your provider.
pub trait QueueClient: fmt::Debug + Send + Sync + 'static {
    /// Create the queue `queue` unless it already exists.
    fn create_queue_if_not_exists(&self, queue: &str) -> Result<(), Error>;

    /// Send one message to the queue `queue`.
    fn send_message(&self, queue: &str, message: &[u8]) -> Result<(), Error>;
}

/// A sink that sends each payload as one message to a queue.
///
/// Queue names are lowercased, then must be 3 to 63 characters of lowercase
/// ASCII letters, digits and single hyphens, starting and ending with a letter
/// or a digit.
///
/// # Examples
///
/// ```
/// use logforth_buffered::Error;
/// use logforth_buffered::sink::Queue;
/// use logforth_buffered::sink::QueueClient;
///
/// #[derive(Debug)]
/// struct Discard;
///
/// impl QueueClient for Discard {
///     fn create_queue_if_not_exists(&self, _: &str) -> Result<(), Error> {
///         Ok(())
///     }
///
///     fn send_message(&self, _: &str, _: &[u8]) -> Result<(), Error> {
///         Ok(())
///     }
/// }
///
/// let queue = Queue::new(Discard, "AppLogs").unwrap();
/// assert_eq!(queue.name(), "applogs");
/// ```
#[derive(Debug)]
pub struct Queue<C> {
    client: C,
    name: String,
}

impl<C: QueueClient> Queue<C> {
    /// Create a queue sink named `name` on `client`.
    ///
    /// Returns a configuration error if the normalized name is invalid.
    pub fn new(client: C, name: impl AsRef<str>) -> Result<Self, Error> {
        let name = normalize_queue_name(name.as_ref())?;
        Ok(Queue { client, name })
    }

    /// The normalized queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: QueueClient> Sink for Queue<C> {
    fn ensure_exists(&self) -> Result<(), Error> {
        self.client
            .create_queue_if_not_exists(&self.name)
            .map_err(|err| {
                Error::sink("failed to create queue")
                    .with_context("queue", &self.name)
                    .with_source(err)
            })
    }

    fn put(&self, payload: &Payload) -> Result<(), Error> {
        self.client.send_message(&self.name, payload.body())
    }
}

fn normalize_queue_name(name: &str) -> Result<String, Error> {
    let name = name.trim().to_ascii_lowercase();
    let invalid = |reason: &str| {
        Error::configuration(format!("invalid queue name: {reason}")).with_context("queue", &name)
    };

    if name.len() < 3 || name.len() > 63 {
        return Err(invalid("must be 3 to 63 characters long"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid("only letters, digits and hyphens are allowed"));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with a letter or a digit"));
    }
    if name.contains("--") {
        return Err(invalid("consecutive hyphens are not allowed"));
    }

    Ok(name)
}
