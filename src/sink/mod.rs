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

//! Remote destinations for rendered envelopes.

use std::borrow::Cow;
use std::fmt;

use crate::Error;
use crate::envelope::Envelope;

mod queue;
mod table;
mod testing;

pub use self::queue::Queue;
pub use self::queue::QueueClient;
pub use self::table::Row;
pub use self::table::RowKeys;
pub use self::table::Table;
pub use self::table::TableClient;
pub use self::table::TimeBucketKeys;
pub use self::testing::Testing;

/// One rendered envelope on its way to a sink.
#[derive(Debug)]
pub struct Payload<'a> {
    envelope: &'a Envelope,
    sequence: u64,
    body: Vec<u8>,
}

impl<'a> Payload<'a> {
    /// Create a payload. The engine does this during a flush.
    pub fn new(envelope: &'a Envelope, sequence: u64, body: Vec<u8>) -> Self {
        Payload {
            envelope,
            sequence,
            body,
        }
    }

    /// The envelope this payload was rendered from.
    pub fn envelope(&self) -> &'a Envelope {
        self.envelope
    }

    /// The delivery sequence number.
    ///
    /// Sequence numbers increase by one for every event an engine flushes,
    /// across flushes, in buffer order.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The rendered bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The rendered bytes as text, replacing invalid UTF-8.
    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// A durable destination for rendered envelopes.
pub trait Sink: fmt::Debug + Send + Sync + 'static {
    /// Create the destination if it does not exist.
    ///
    /// Called once on activation. Must be idempotent.
    fn ensure_exists(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Deliver one payload.
    ///
    /// May be called concurrently from several threads of the same flush.
    fn put(&self, payload: &Payload) -> Result<(), Error>;

    /// Whether the engine should hand a whole flush to [`Sink::put_batch`]
    /// instead of fanning out [`Sink::put`] calls.
    ///
    /// Default to `false`.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Deliver a batch of payloads, returning one result per payload in order.
    ///
    /// Default to calling [`Sink::put`] for each payload.
    fn put_batch(&self, payloads: &[Payload]) -> Vec<Result<(), Error>> {
        payloads.iter().map(|payload| self.put(payload)).collect()
    }
}

impl<T: Sink> From<T> for Box<dyn Sink> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}
