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

use std::fmt::Write;

use crate::Error;
use crate::Layout;
use crate::envelope::Envelope;

/// A layout that renders envelopes as a single line of plain text.
///
/// Output format:
///
/// ```text
/// 2024-08-11T14:44:57.172Z [main] ERROR storage - Hello error!
/// 2024-08-11T14:44:57.172Z [main] WARN storage - Hello warn!
/// 2024-08-11T14:44:57.173Z [worker-1] INFO http - Hello info!
/// ```
///
/// Timestamps are always rendered in UTC with millisecond precision.
///
/// # Examples
///
/// ```
/// use logforth_buffered::layout::PlainTextLayout;
///
/// let text_layout = PlainTextLayout::default();
/// ```
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct PlainTextLayout {}

impl Layout for PlainTextLayout {
    fn format(&self, envelope: &Envelope) -> Result<Vec<u8>, Error> {
        let mut text = String::new();

        let timestamp = envelope.timestamp();
        let thread = envelope.thread_name();
        let level = envelope.level();
        let logger = envelope.logger_name();
        let message = envelope.message();

        // SAFETY: write to a string always succeeds
        write!(
            &mut text,
            "{timestamp:.3} [{thread}] {level} {logger} - {message}"
        )
        .unwrap();

        Ok(text.into_bytes())
    }
}
