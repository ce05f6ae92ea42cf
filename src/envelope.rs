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

//! Log events and their severity.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::Error;
use crate::ErrorKind;

/// One captured log occurrence.
///
/// An envelope cannot be changed once built. The engine owns it from
/// [`append`](crate::Buffered::append) until the flush that delivers it.
#[derive(Debug, PartialEq, Eq)]
pub struct Envelope {
    timestamp: Timestamp,
    level: Level,
    logger_name: String,
    thread_name: String,
    domain: String,
    identity: String,
    user_name: String,
    message: String,
}

impl Envelope {
    /// Returns a new builder for an envelope carrying `message`.
    ///
    /// # Examples
    ///
    /// ```
    /// use logforth_buffered::envelope::Envelope;
    /// use logforth_buffered::envelope::Level;
    ///
    /// let envelope = Envelope::builder("disk almost full")
    ///     .level(Level::Warn)
    ///     .logger_name("storage")
    ///     .build();
    /// assert_eq!(envelope.message(), "disk almost full");
    /// ```
    pub fn builder(message: impl Into<String>) -> EnvelopeBuilder {
        EnvelopeBuilder::new(message)
    }

    /// The time the event was captured.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The severity of the event.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The name of the logger that produced the event.
    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    /// The name of the thread that produced the event.
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// The application domain, usually the process name.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The identity of the principal the event was logged under.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The operating system user name.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// The message body.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Builder for [`Envelope`].
#[derive(Debug)]
pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl EnvelopeBuilder {
    /// Create a builder with the capture time set to now and level [`Level::Info`].
    pub fn new(message: impl Into<String>) -> Self {
        EnvelopeBuilder {
            envelope: Envelope {
                timestamp: Timestamp::now(),
                level: Level::Info,
                logger_name: String::new(),
                thread_name: String::new(),
                domain: String::new(),
                identity: String::new(),
                user_name: String::new(),
                message: message.into(),
            },
        }
    }

    /// Set [`timestamp`](Envelope::timestamp).
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.envelope.timestamp = timestamp;
        self
    }

    /// Set [`level`](Envelope::level).
    pub fn level(mut self, level: Level) -> Self {
        self.envelope.level = level;
        self
    }

    /// Set [`logger_name`](Envelope::logger_name).
    pub fn logger_name(mut self, logger_name: impl Into<String>) -> Self {
        self.envelope.logger_name = logger_name.into();
        self
    }

    /// Set [`thread_name`](Envelope::thread_name).
    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.envelope.thread_name = thread_name.into();
        self
    }

    /// Set [`domain`](Envelope::domain).
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.envelope.domain = domain.into();
        self
    }

    /// Set [`identity`](Envelope::identity).
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.envelope.identity = identity.into();
        self
    }

    /// Set [`user_name`](Envelope::user_name).
    pub fn user_name(mut self, user_name: impl Into<String>) -> Self {
        self.envelope.user_name = user_name.into();
        self
    }

    /// Invoke the builder and return an `Envelope`.
    pub fn build(self) -> Envelope {
        self.envelope
    }
}

/// The severity of an event, ordered from least to most severe.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Designates information useful when debugging.
    Debug,
    /// Designates useful information.
    Info,
    /// Designates hazardous situations.
    Warn,
    /// Designates errors.
    Error,
    /// Designates errors the application cannot recover from.
    Critical,
}

impl Level {
    /// Return the string representation of the `Level`.
    ///
    /// This returns the same string as the `fmt::Display` implementation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;
    fn from_str(s: &str) -> Result<Level, Self::Err> {
        for (name, level) in [
            ("debug", Level::Debug),
            ("info", Level::Info),
            ("warn", Level::Warn),
            ("warning", Level::Warn),
            ("error", Level::Error),
            ("critical", Level::Critical),
            ("crit", Level::Critical),
            ("fatal", Level::Critical),
        ] {
            if s.eq_ignore_ascii_case(name) {
                return Ok(level);
            }
        }

        Err(Error::new(
            ErrorKind::Configuration,
            format!("malformed level: {s:?}"),
        ))
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug | log::Level::Trace => Level::Debug,
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
