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

//! Settings consumed on activation.

use std::time::Duration;

use jiff::SignedDuration;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::envelope::Level;

/// How an `append` that fills the buffer waits for the flush it triggers.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Hand the batch to the flush worker and return immediately.
    #[default]
    Background,
    /// Wait until the triggered flush completes or `flush_timeout` passes.
    Blocking,
}

/// Settings of a buffered appender.
///
/// Deserializable from any serde format. Durations accept both the friendly
/// (`"30s"`, `"1m 30s"`) and the ISO 8601 (`"PT30S"`) forms.
///
/// # Examples
///
/// ```
/// use logforth_buffered::config::Config;
///
/// let config = Config::new("UseDevelopmentStorage=true", "testLoggingQueue").buffer_size(100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of buffered events that triggers a flush.
    pub buffer_size: usize,
    /// Opaque identifier resolved into sink credentials on activation.
    pub connection: Option<String>,
    /// Name of the queue or table to write to.
    pub destination: Option<String>,
    /// Flush whatever is buffered at this interval, if set.
    pub flush_interval: Option<SignedDuration>,
    /// Flush immediately after buffering an event at or above this level, if set.
    pub flush_level: Option<Level>,
    /// Minimum level accepted through the `log` facade.
    pub threshold: Level,
    /// Maximum number of concurrent sink calls within one flush.
    pub max_concurrency: usize,
    /// Maximum number of batches waiting for the flush worker.
    pub max_pending_flushes: usize,
    /// Upper bound of every wait on the flush worker.
    pub flush_timeout: SignedDuration,
    /// How a size-triggered flush is awaited.
    pub mode: FlushMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_size: 512,
            connection: None,
            destination: None,
            flush_interval: None,
            flush_level: None,
            threshold: Level::Debug,
            max_concurrency: 8,
            max_pending_flushes: 16,
            flush_timeout: SignedDuration::from_secs(30),
            mode: FlushMode::Background,
        }
    }
}

impl Config {
    /// Create a config with default settings for `destination` reached through `connection`.
    pub fn new(connection: impl Into<String>, destination: impl Into<String>) -> Self {
        Config {
            connection: Some(connection.into()),
            destination: Some(destination.into()),
            ..Config::default()
        }
    }

    /// Set the number of buffered events that triggers a flush.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the time-triggered flush interval.
    pub fn flush_interval(mut self, interval: impl Into<Option<SignedDuration>>) -> Self {
        self.flush_interval = interval.into();
        self
    }

    /// Set the level that triggers an immediate flush.
    pub fn flush_level(mut self, level: impl Into<Option<Level>>) -> Self {
        self.flush_level = level.into();
        self
    }

    /// Set the minimum level accepted through the `log` facade.
    pub fn threshold(mut self, threshold: Level) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the maximum number of concurrent sink calls within one flush.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the maximum number of batches waiting for the flush worker.
    pub fn max_pending_flushes(mut self, max_pending_flushes: usize) -> Self {
        self.max_pending_flushes = max_pending_flushes;
        self
    }

    /// Set the upper bound of every wait on the flush worker.
    pub fn flush_timeout(mut self, timeout: SignedDuration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Set how a size-triggered flush is awaited.
    pub fn mode(mut self, mode: FlushMode) -> Self {
        self.mode = mode;
        self
    }

    /// Check that every required setting is present and in range.
    pub fn validate(&self) -> Result<(), Error> {
        self.resolve().map(|_| ())
    }

    pub(crate) fn resolve(&self) -> Result<Settings, Error> {
        let connection = required(&self.connection, "connection")?;
        let destination = required(&self.destination, "destination")?;

        if self.buffer_size == 0 {
            return Err(Error::configuration("buffer_size must be positive"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::configuration("max_concurrency must be positive"));
        }
        if self.max_pending_flushes == 0 {
            return Err(Error::configuration("max_pending_flushes must be positive"));
        }

        let flush_timeout = positive(self.flush_timeout, "flush_timeout")?;
        let flush_interval = match self.flush_interval {
            Some(interval) => Some(positive(interval, "flush_interval")?),
            None => None,
        };

        Ok(Settings {
            destination: Destination {
                connection,
                name: destination,
            },
            buffer_size: self.buffer_size,
            flush_interval,
            flush_level: self.flush_level,
            threshold: self.threshold,
            max_concurrency: self.max_concurrency,
            max_pending_flushes: self.max_pending_flushes,
            flush_timeout,
            mode: self.mode,
        })
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, Error> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(Error::configuration(format!("{name} is not specified")).with_context("setting", name)),
    }
}

fn positive(duration: SignedDuration, name: &'static str) -> Result<Duration, Error> {
    if duration.is_zero() || duration.is_negative() {
        return Err(Error::configuration(format!("{name} must be positive"))
            .with_context("setting", name)
            .with_context("value", duration));
    }
    Duration::try_from(duration).map_err(|err| {
        Error::configuration(format!("{name} is out of range"))
            .with_context("setting", name)
            .with_source(err)
    })
}

/// Where a sink should deliver, as resolved from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    connection: String,
    name: String,
}

impl Destination {
    /// The connection identifier to resolve into sink credentials.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// The queue or table name, as configured.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) destination: Destination,
    pub(crate) buffer_size: usize,
    pub(crate) flush_interval: Option<Duration>,
    pub(crate) flush_level: Option<Level>,
    pub(crate) threshold: Level,
    pub(crate) max_concurrency: usize,
    pub(crate) max_pending_flushes: usize,
    pub(crate) flush_timeout: Duration,
    pub(crate) mode: FlushMode,
}
