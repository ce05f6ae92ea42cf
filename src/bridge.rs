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

//! Bridge from the `log` facade.

use crate::Buffered;
use crate::ErrorKind;
use crate::envelope::Envelope;
use crate::envelope::Level;

/// Process-wide fields stamped on every envelope captured through `log`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Process {
    domain: String,
    user_name: String,
}

impl Process {
    pub(crate) fn capture() -> Self {
        let domain = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let user_name = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        Process { domain, user_name }
    }
}

impl log::Log for Buffered {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        Level::from(metadata.level()) >= self.threshold
    }

    fn log(&self, record: &log::Record) {
        if !log::Log::enabled(self, record.metadata()) {
            return;
        }

        let thread = std::thread::current();
        let thread_name = match thread.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", thread.id()),
        };

        let mut visitor = KvCollector {
            message: record.args().to_string(),
            identity: String::new(),
        };
        // a malformed key-value only loses the remaining pairs
        let _ = record.key_values().visit(&mut visitor);

        let envelope = Envelope::builder(visitor.message)
            .level(record.level().into())
            .logger_name(record.target())
            .thread_name(thread_name)
            .domain(&self.process.domain)
            .identity(visitor.identity)
            .user_name(&self.process.user_name)
            .build();

        self.trap_open(self.append(envelope));
    }

    fn flush(&self) {
        self.trap_open(Buffered::flush(self));
    }
}

impl Buffered {
    // records logged after shutdown are dropped quietly
    fn trap_open(&self, result: Result<(), crate::Error>) {
        if let Err(err) = result {
            if err.kind() != ErrorKind::Closed {
                self.trap.trap(&err);
            }
        }
    }
}

/// Moves the `identity` key onto the envelope and appends the other pairs
/// to the message as `key=value`.
struct KvCollector {
    message: String,
    identity: String,
}

impl<'kvs> log::kv::VisitSource<'kvs> for KvCollector {
    fn visit_pair(
        &mut self,
        key: log::kv::Key<'kvs>,
        value: log::kv::Value<'kvs>,
    ) -> Result<(), log::kv::Error> {
        if key.as_str() == "identity" {
            self.identity = value.to_string();
        } else {
            self.message.push_str(&format!(" {key}={value}"));
        }
        Ok(())
    }
}
