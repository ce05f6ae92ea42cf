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

mod common;

use std::time::Duration;

use jiff::SignedDuration;
use logforth_buffered::BufferedBuilder;
use logforth_buffered::ErrorKind;
use logforth_buffered::config::FlushMode;
use logforth_buffered::envelope::Envelope;
use logforth_buffered::envelope::Level;

use crate::common::BatchSink;
use crate::common::CollectTrap;
use crate::common::EventSink;
use crate::common::MessageLayout;
use crate::common::Recorder;
use crate::common::config;
use crate::common::envelope;
use crate::common::messages;

#[test]
fn full_buffer_is_flushed_once_in_order() {
    let recorder = Recorder::default();
    let layout = MessageLayout::default();
    let buffered = BufferedBuilder::new(config(5))
        .layout(layout.clone())
        .activate(|_| Ok(BatchSink::new(&recorder)))
        .unwrap();

    for i in 0..5 {
        buffered.append(envelope(format!("m{i}"), i as i64)).unwrap();
    }
    assert_eq!(buffered.buffered(), 0);

    // waits for the size-triggered flush without adding one
    buffered.flush().unwrap();

    assert_eq!(recorder.batches(), vec![messages("m", 0..5)]);
    assert_eq!(layout.rendered(), messages("m", 0..5));
}

#[test]
fn no_flush_below_buffer_size() {
    let recorder = Recorder::default();
    let buffered = BufferedBuilder::new(config(10))
        .layout(MessageLayout::default())
        .activate(|_| Ok(BatchSink::new(&recorder)))
        .unwrap();

    for i in 0..9 {
        buffered.append(envelope(format!("m{i}"), i as i64)).unwrap();
    }
    std::thread::sleep(Duration::from_millis(50));
    assert!(recorder.batches().is_empty());
    assert_eq!(buffered.buffered(), 9);

    buffered.flush().unwrap();
    assert_eq!(recorder.batches(), vec![messages("m", 0..9)]);
    assert_eq!(buffered.buffered(), 0);
}

#[test]
fn second_flush_is_a_no_op() {
    let recorder = Recorder::default();
    let buffered = BufferedBuilder::new(config(10))
        .layout(MessageLayout::default())
        .activate(|_| Ok(EventSink::new(&recorder)))
        .unwrap();

    buffered.append(envelope("m0", 0)).unwrap();
    buffered.append(envelope("m1", 1)).unwrap();
    buffered.flush().unwrap();
    assert_eq!(recorder.puts().len(), 2);

    buffered.flush().unwrap();
    assert_eq!(recorder.puts().len(), 2);
    assert_eq!(buffered.buffered(), 0);
}

#[test]
fn hundred_events_make_ten_flushes() {
    let recorder = Recorder::default();
    let buffered = BufferedBuilder::new(config(10))
        .layout(MessageLayout::default())
        .activate(|_| Ok(BatchSink::new(&recorder)))
        .unwrap();

    for i in 0..100 {
        buffered.append(envelope(format!("m{i}"), i as i64)).unwrap();
    }
    buffered.flush().unwrap();

    let batches = recorder.batches();
    assert_eq!(batches.len(), 10);
    assert!(batches.iter().all(|batch| batch.len() == 10));
    assert_eq!(batches.concat(), messages("m", 0..100));
}

#[test]
fn shutdown_drains_and_closes() {
    let recorder = Recorder::default();
    let buffered = BufferedBuilder::new(config(10))
        .layout(MessageLayout::default())
        .activate(|_| Ok(BatchSink::new(&recorder)))
        .unwrap();

    for i in 0..3 {
        buffered.append(envelope(format!("m{i}"), i as i64)).unwrap();
    }
    buffered.shutdown();
    assert_eq!(recorder.batches(), vec![messages("m", 0..3)]);

    let err = buffered.append(envelope("late", 3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
    let err = buffered.flush().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);

    // idempotent
    buffered.shutdown();
    assert_eq!(recorder.batches().len(), 1);
}

#[test]
fn drop_flushes_remaining_events() {
    let recorder = Recorder::default();
    {
        let buffered = BufferedBuilder::new(config(10))
            .layout(MessageLayout::default())
            .activate(|_| Ok(BatchSink::new(&recorder)))
            .unwrap();
        buffered.append(envelope("m0", 0)).unwrap();
    }
    assert_eq!(recorder.batches(), vec![messages("m", 0..1)]);
}

#[test]
fn flush_level_triggers_an_immediate_flush() {
    let recorder = Recorder::default();
    let buffered = BufferedBuilder::new(
        config(100)
            .flush_level(Level::Error)
            .mode(FlushMode::Blocking),
    )
    .layout(MessageLayout::default())
    .activate(|_| Ok(BatchSink::new(&recorder)))
    .unwrap();

    let event = |message: &str, level| Envelope::builder(message).level(level).build();
    buffered.append(event("m0", Level::Info)).unwrap();
    buffered.append(event("m1", Level::Warn)).unwrap();
    assert!(recorder.batches().is_empty());

    buffered.append(event("m2", Level::Critical)).unwrap();
    assert_eq!(recorder.batches(), vec![messages("m", 0..3)]);
}

#[test]
fn blocking_mode_waits_for_the_triggered_flush() {
    let recorder = Recorder::default();
    let buffered = BufferedBuilder::new(config(2).mode(FlushMode::Blocking))
        .layout(MessageLayout::default())
        .activate(|_| Ok(EventSink::new(&recorder)))
        .unwrap();

    buffered.append(envelope("m0", 0)).unwrap();
    assert!(recorder.puts().is_empty());
    buffered.append(envelope("m1", 1)).unwrap();

    let mut puts = recorder.puts();
    puts.sort();
    assert_eq!(puts, messages("m", 0..2));
}

#[test]
fn flush_interval_flushes_a_partial_buffer() {
    let recorder = Recorder::default();
    let buffered = BufferedBuilder::new(
        config(100).flush_interval(SignedDuration::from_millis(20)),
    )
    .layout(MessageLayout::default())
    .activate(|_| Ok(BatchSink::new(&recorder)))
    .unwrap();

    buffered.append(envelope("m0", 0)).unwrap();
    buffered.append(envelope("m1", 1)).unwrap();

    assert!(recorder.wait_for_batches(1, Duration::from_secs(10)));
    assert_eq!(recorder.batches(), vec![messages("m", 0..2)]);
    assert_eq!(buffered.buffered(), 0);
}

#[test]
fn fan_out_is_bounded_and_delivers_each_event_once() {
    let recorder = Recorder::default();
    let mut sink = EventSink::new(&recorder);
    sink.delay = Some(Duration::from_millis(2));

    let buffered = BufferedBuilder::new(config(50).max_concurrency(4))
        .layout(MessageLayout::default())
        .activate(move |_| Ok(sink))
        .unwrap();

    for i in 0..50 {
        buffered.append(envelope(format!("m{i:02}"), i as i64)).unwrap();
    }
    buffered.flush().unwrap();

    let mut puts = recorder.puts();
    puts.sort();
    let expected = (0..50).map(|i| format!("m{i:02}")).collect::<Vec<_>>();
    assert_eq!(puts, expected);
    assert!(recorder.max_in_flight() <= 4, "{}", recorder.max_in_flight());
}

#[test]
fn delivery_errors_are_trapped_not_returned() {
    let recorder = Recorder::default();
    let trap = CollectTrap::default();
    let buffered = BufferedBuilder::new(config(1).mode(FlushMode::Blocking))
        .layout(MessageLayout::default())
        .trap(trap.clone())
        .activate(|_| Ok(BatchSink::new(&recorder).failing_on("m0")))
        .unwrap();

    buffered.append(envelope("m0", 0)).unwrap();
    buffered.append(envelope("m1", 1)).unwrap();

    let errors = trap.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Sink);
    assert_eq!(errors[0].sequence.as_deref(), Some("0"));
    assert_eq!(recorder.batches(), vec![messages("m", 0..1), messages("m", 1..2)]);
}
