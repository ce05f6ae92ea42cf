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

use std::borrow::Cow;
use std::fmt;

use jiff::Timestamp;
use jiff::tz::TimeZone;
use serde::Serialize;

use crate::Error;
use crate::envelope::Level;
use crate::sink::Payload;
use crate::sink::Sink;

/// The transport behind a [`Table`] sink.
///
/// Implement this over the table store client of your provider.
pub trait TableClient: fmt::Debug + Send + Sync + 'static {
    /// Create the table `table` unless it already exists.
    fn create_table_if_not_exists(&self, table: &str) -> Result<(), Error>;

    /// Insert `row`, replacing any row with the same partition and row key.
    fn upsert(&self, table: &str, row: &Row) -> Result<(), Error>;

    /// Upsert several rows, returning one result per row in order.
    ///
    /// Default to calling [`TableClient::upsert`] for each row. Override this
    /// when the store has a batch API; grouping rows by partition is up to the
    /// implementation.
    fn upsert_batch(&self, table: &str, rows: &[Row]) -> Vec<Result<(), Error>> {
        rows.iter().map(|row| self.upsert(table, row)).collect()
    }
}

/// Derives the partition key and row key of a table row.
///
/// Implementations must be deterministic: the same `(timestamp, sequence)`
/// always yields the same keys.
pub trait RowKeys: fmt::Debug + Send + Sync + 'static {
    /// Returns `(partition_key, row_key)`.
    fn keys(&self, timestamp: Timestamp, sequence: u64) -> (String, String);
}

/// Keys rows by hour and by time within the hour.
///
/// * partition key: `yyyyMMddHH` in UTC;
/// * row key: `mmss.fff-<sequence>` with the sequence zero-padded to ten digits,
///   followed by `-<discriminator>` if one is set.
///
/// Set a discriminator, such as the host name, when several processes write
/// to the same table.
///
/// # Examples
///
/// ```
/// use jiff::Timestamp;
/// use logforth_buffered::sink::RowKeys;
/// use logforth_buffered::sink::TimeBucketKeys;
///
/// let ts: Timestamp = "2024-08-11T14:44:57.172Z".parse().unwrap();
/// let (partition, row) = TimeBucketKeys::default().keys(ts, 42);
/// assert_eq!(partition, "2024081114");
/// assert_eq!(row, "4457.172-0000000042");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TimeBucketKeys {
    discriminator: Option<String>,
}

impl TimeBucketKeys {
    /// Append `discriminator` to every row key.
    pub fn discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }
}

impl RowKeys for TimeBucketKeys {
    fn keys(&self, timestamp: Timestamp, sequence: u64) -> (String, String) {
        let zoned = timestamp.to_zoned(TimeZone::UTC);
        let partition = zoned.strftime("%Y%m%d%H").to_string();
        let mut row = format!(
            "{}.{:03}-{sequence:010}",
            zoned.strftime("%M%S"),
            zoned.millisecond()
        );
        if let Some(discriminator) = &self.discriminator {
            row.push('-');
            row.push_str(discriminator);
        }
        (partition, row)
    }
}

/// One table row produced from a payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Row<'a> {
    /// The partition key.
    pub partition_key: String,
    /// The row key, unique within the partition.
    pub row_key: String,
    /// The capture time of the event.
    pub event_time_stamp: Timestamp,
    /// The severity of the event.
    pub level: Level,
    /// The logger name.
    pub logger_name: &'a str,
    /// The thread name.
    pub thread_name: &'a str,
    /// The application domain.
    pub domain: &'a str,
    /// The principal identity.
    pub identity: &'a str,
    /// The user name.
    pub user_name: &'a str,
    /// The raw message.
    pub message: &'a str,
    /// The rendered payload.
    pub payload: Cow<'a, str>,
}

impl<'a> Row<'a> {
    /// Build the row for `payload`, deriving its keys with `keys`.
    pub fn new(payload: &'a Payload, keys: &dyn RowKeys) -> Self {
        let envelope = payload.envelope();
        let (partition_key, row_key) = keys.keys(envelope.timestamp(), payload.sequence());
        Row {
            partition_key,
            row_key,
            event_time_stamp: envelope.timestamp(),
            level: envelope.level(),
            logger_name: envelope.logger_name(),
            thread_name: envelope.thread_name(),
            domain: envelope.domain(),
            identity: envelope.identity(),
            user_name: envelope.user_name(),
            message: envelope.message(),
            payload: payload.body_str(),
        }
    }
}

/// A sink that upserts each payload as one row of a table.
///
/// Table names must be 3 to 63 ASCII letters or digits, starting with a letter.
/// Rows are keyed by [`TimeBucketKeys`] unless [`Table::keys`] sets another
/// strategy.
#[derive(Debug)]
pub struct Table<C, K = TimeBucketKeys> {
    client: C,
    name: String,
    keys: K,
}

impl<C: TableClient> Table<C> {
    /// Create a table sink named `name` on `client`.
    ///
    /// Returns a configuration error if the name is invalid.
    pub fn new(client: C, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        validate_table_name(&name)?;
        Ok(Table {
            client,
            name,
            keys: TimeBucketKeys::default(),
        })
    }
}

impl<C: TableClient, K: RowKeys> Table<C, K> {
    /// Set the key derivation strategy.
    pub fn keys<K2: RowKeys>(self, keys: K2) -> Table<C, K2> {
        Table {
            client: self.client,
            name: self.name,
            keys,
        }
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: TableClient, K: RowKeys> Sink for Table<C, K> {
    fn ensure_exists(&self) -> Result<(), Error> {
        self.client
            .create_table_if_not_exists(&self.name)
            .map_err(|err| {
                Error::sink("failed to create table")
                    .with_context("table", &self.name)
                    .with_source(err)
            })
    }

    fn put(&self, payload: &Payload) -> Result<(), Error> {
        let row = Row::new(payload, &self.keys);
        self.client.upsert(&self.name, &row)
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn put_batch(&self, payloads: &[Payload]) -> Vec<Result<(), Error>> {
        let rows = payloads
            .iter()
            .map(|payload| Row::new(payload, &self.keys))
            .collect::<Vec<_>>();
        self.client.upsert_batch(&self.name, &rows)
    }
}

fn validate_table_name(name: &str) -> Result<(), Error> {
    let valid = (3..=63).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.bytes().all(|b| b.is_ascii_alphanumeric());

    if valid {
        Ok(())
    } else {
        Err(Error::configuration(
            "invalid table name: must be 3 to 63 letters or digits, starting with a letter",
        )
        .with_context("table", name))
    }
}
