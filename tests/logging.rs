//! Tests for the log records emitted on the receive path.

mod common;

use common::{
    FIRE_AND_FORGET_FRAME,
    Harness,
    SOCKET,
    STREAMING_FRAME,
    TestResult,
    default_peer,
    standard_routes,
    stream_config,
};
use log::Level;
use pdumux::{ConnectionEvent, ReconnectReason, Refused};
use pdumux_testing::{LoggerHandle, RecordingConsumer, frame, frames, logger};
use rstest::rstest;
use serial_test::serial;

fn logged(messages: &[(Level, String)], level: Level, needle: &str) -> bool {
    messages
        .iter()
        .any(|(l, message)| *l == level && message.contains(needle))
}

#[rstest]
#[serial(logging)]
fn invalid_length_warns_and_requests_reconnect(mut logger: LoggerHandle) -> TestResult {
    let mut config = stream_config(standard_routes());
    config.groups[0].max_pdu_len = 16;
    let harness = Harness::new(config)?;
    harness.connect_stream()?;
    logger.messages();

    harness.engine.on_stream_data(
        SOCKET,
        default_peer(),
        &frame(FIRE_AND_FORGET_FRAME, &[0; 20]),
    )?;

    let messages = logger.messages();
    assert!(
        logged(&messages, Level::Warn, "declares an invalid length"),
        "missing drop warning: {messages:?}"
    );
    assert!(
        logged(
            &messages,
            Level::Warn,
            "ConnectionId(0): requesting reconnect (invalid_length)"
        ),
        "missing reconnect warning: {messages:?}"
    );
    Ok(())
}

#[rstest]
#[serial(logging)]
fn persistent_refusal_escalates(mut logger: LoggerHandle) -> TestResult {
    let mut config = stream_config(standard_routes());
    config.groups[0].connections[0].linear_capacity = 16;
    let consumer = RecordingConsumer::default();
    consumer.script_starts([Err(Refused), Err(Refused)]);
    let harness = Harness::with_consumer(config, consumer)?;
    let connection = harness.connect_stream()?;
    logger.messages();

    harness.engine.on_stream_data(
        SOCKET,
        default_peer(),
        &frames(&[(STREAMING_FRAME, &[0; 10]), (STREAMING_FRAME, &[0; 10])]),
    )?;

    let messages = logger.messages();
    assert!(
        logged(&messages, Level::Warn, "consumer refused 20 bytes in a row"),
        "missing refusal warning: {messages:?}"
    );
    assert_eq!(
        harness.transport.events(),
        vec![ConnectionEvent::ReconnectRequested {
            connection,
            reason: ReconnectReason::ConsumerRefused,
        }]
    );
    Ok(())
}

#[rstest]
#[serial(logging)]
fn cancellation_is_logged(mut logger: LoggerHandle) -> TestResult {
    let harness = Harness::with_consumer(
        stream_config(standard_routes()),
        RecordingConsumer::with_budget(1),
    )?;
    let connection = harness.connect_stream()?;
    harness.engine.on_stream_data(
        SOCKET,
        default_peer(),
        &frame(STREAMING_FRAME, &[0; 4]),
    )?;
    logger.messages();

    harness.engine.cancel_receive(connection)?;
    harness.engine.drive(connection)?;

    let messages = logger.messages();
    assert!(
        logged(&messages, Level::Info, "ConnectionId(0): reception cancelled"),
        "missing cancellation record: {messages:?}"
    );
    assert!(
        logged(&messages, Level::Warn, "requesting reconnect (cancelled)"),
        "missing reconnect warning: {messages:?}"
    );
    Ok(())
}
