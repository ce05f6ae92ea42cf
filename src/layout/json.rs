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

use jiff::TimestampDisplayWithOffset;
use jiff::tz::TimeZone;
use serde::Serialize;

use crate::Error;
use crate::ErrorKind;
use crate::Layout;
use crate::envelope::Envelope;

/// A JSON layout for rendering envelopes.
///
/// Output format:
///
/// ```json
/// {"timestamp":"2024-08-11T14:44:57.172051+00:00","level":"ERROR","logger":"storage","thread":"main","message":"Hello error!"}
/// {"timestamp":"2024-08-11T14:44:57.172187+00:00","level":"WARN","logger":"storage","thread":"main","domain":"server","message":"Hello warn!"}
/// ```
///
/// Empty envelope fields are omitted. Timestamps default to UTC.
///
/// # Examples
///
/// ```
/// use logforth_buffered::layout::JsonLayout;
///
/// let json_layout = JsonLayout::default();
/// ```
#[derive(Default, Debug, Clone)]
pub struct JsonLayout {
    tz: Option<TimeZone>,
}

impl JsonLayout {
    /// Set the timezone for timestamps.
    ///
    /// # Examples
    ///
    /// ```
    /// use jiff::tz::TimeZone;
    /// use logforth_buffered::layout::JsonLayout;
    ///
    /// let layout = JsonLayout::default().timezone(TimeZone::fixed(jiff::tz::offset(8)));
    /// ```
    pub fn timezone(mut self, tz: TimeZone) -> Self {
        self.tz = Some(tz);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct EnvelopeLine<'a> {
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: TimestampDisplayWithOffset,
    level: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    logger: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    thread: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    domain: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    identity: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    user: &'a str,
    message: &'a str,
}

fn serialize_timestamp<S>(
    timestamp: &TimestampDisplayWithOffset,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&format_args!("{timestamp:.6}"))
}

impl Layout for JsonLayout {
    fn format(&self, envelope: &Envelope) -> Result<Vec<u8>, Error> {
        let ts = envelope.timestamp();
        let tz = self.tz.clone().unwrap_or(TimeZone::UTC);
        let offset = tz.to_offset(ts);

        let line = EnvelopeLine {
            timestamp: ts.display_with_offset(offset),
            level: envelope.level().as_str(),
            logger: envelope.logger_name(),
            thread: envelope.thread_name(),
            domain: envelope.domain(),
            identity: envelope.identity(),
            user: envelope.user_name(),
            message: envelope.message(),
        };

        serde_json::to_vec(&line).map_err(|err| {
            Error::new(ErrorKind::Render, "failed to serialize envelope").with_source(err)
        })
    }
}
