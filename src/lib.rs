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

//! A buffering appender that batches log events in memory and flushes them to
//! a remote queue or table store.
//!
//! # Overview
//!
//! [`Buffered`] holds appended [`Envelope`](envelope::Envelope)s until a flush
//! is due, then renders them with a [`Layout`] and hands them to a [`Sink`] on
//! a background worker. Every event is attempted exactly once; failures go to
//! a [`Trap`] and never reach the logging caller.
//!
//! Sinks for message queues and table stores are built from a narrow client
//! trait, see [`sink::Queue`] and [`sink::Table`].
//!
//! # Examples
//!
//! ```
//! use logforth_buffered::BufferedBuilder;
//! use logforth_buffered::config::Config;
//! use logforth_buffered::envelope::Envelope;
//! use logforth_buffered::envelope::Level;
//! use logforth_buffered::sink::Testing;
//!
//! let config = Config::new("UseDevelopmentStorage=true", "testLoggingQueue")
//!     .buffer_size(10)
//!     .flush_level(Level::Error);
//!
//! let buffered = BufferedBuilder::new(config)
//!     .activate(|_destination| Ok(Testing::default()))
//!     .unwrap();
//!
//! buffered
//!     .append(Envelope::builder("Hello info!").level(Level::Info).build())
//!     .unwrap();
//! buffered.flush().unwrap();
//! ```
//!
//! A [`Buffered`] appender also implements [`log::Log`]:
//!
//! ```
//! use logforth_buffered::BufferedBuilder;
//! use logforth_buffered::config::Config;
//! use logforth_buffered::sink::Testing;
//!
//! let buffered = BufferedBuilder::new(Config::new("conn", "logs"))
//!     .activate(|_| Ok(Testing::default()))
//!     .unwrap();
//! log::set_boxed_logger(Box::new(buffered)).unwrap();
//! log::set_max_level(log::LevelFilter::Info);
//!
//! log::info!("Hello log!");
//! log::logger().flush();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod envelope;
pub mod layout;
pub mod sink;
pub mod trap;

mod bridge;
mod buffered;
mod error;

pub use self::buffered::Buffered;
pub use self::buffered::BufferedBuilder;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::layout::Layout;
pub use self::sink::Sink;
pub use self::trap::Trap;
