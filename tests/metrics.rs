#![cfg(feature = "metrics")]
//! Tests for the counters the receive path records.
//!
//! Engine calls run under a local `DebuggingRecorder` so each test only sees
//! its own counters.

mod common;

use common::{
    FIRE_AND_FORGET_FRAME,
    Harness,
    SOCKET,
    STREAMING_FRAME,
    TestResult,
    datagram_config,
    default_peer,
    peer,
    standard_routes,
    stream_config,
};
use pdumux::{
    BYTES_ACKNOWLEDGED,
    DATAGRAMS_REJECTED,
    FRAMES_DELIVERED,
    FRAMES_DROPPED,
    RECONNECTS_REQUESTED,
    config::{RemotePattern, TrailingPolicy},
};
use pdumux_testing::{counter_total, counters, debugging_recorder_setup, frame, frames};

#[test]
fn delivered_frames_are_counted_per_contract() -> TestResult {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let harness = Harness::new(stream_config(standard_routes()))?;
    harness.connect_stream()?;
    let bytes = frames(&[
        (STREAMING_FRAME, &[1]),
        (FIRE_AND_FORGET_FRAME, &[2]),
        (FIRE_AND_FORGET_FRAME, &[3]),
    ]);

    metrics::with_local_recorder(&recorder, || {
        harness
            .engine
            .on_stream_data(SOCKET, default_peer(), &bytes)
    })?;

    let samples = counters(&snapshotter);
    assert_eq!(
        counter_total(&samples, FRAMES_DELIVERED, Some(("contract", "streaming"))),
        1
    );
    assert_eq!(
        counter_total(
            &samples,
            FRAMES_DELIVERED,
            Some(("contract", "fire_and_forget"))
        ),
        2
    );
    assert_eq!(
        counter_total(&samples, BYTES_ACKNOWLEDGED, None),
        bytes.len() as u64
    );
    Ok(())
}

#[test]
fn invalid_length_counts_drop_and_reconnect() -> TestResult {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let mut config = stream_config(standard_routes());
    config.groups[0].max_pdu_len = 16;
    let harness = Harness::new(config)?;
    harness.connect_stream()?;
    let bytes = frame(FIRE_AND_FORGET_FRAME, &[0; 32]);

    metrics::with_local_recorder(&recorder, || {
        harness
            .engine
            .on_stream_data(SOCKET, default_peer(), &bytes)
    })?;

    let samples = counters(&snapshotter);
    assert_eq!(
        counter_total(&samples, FRAMES_DROPPED, Some(("reason", "invalid_length"))),
        1
    );
    assert_eq!(
        counter_total(
            &samples,
            RECONNECTS_REQUESTED,
            Some(("reason", "invalid_length"))
        ),
        1
    );
    assert_eq!(counter_total(&samples, FRAMES_DELIVERED, None), 0);
    Ok(())
}

#[test]
fn unknown_route_and_peer_mismatch_are_labelled() -> TestResult {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let harness = Harness::new(stream_config(standard_routes()))?;
    harness.connect_stream()?;

    metrics::with_local_recorder(&recorder, || -> TestResult {
        harness
            .engine
            .on_stream_data(SOCKET, default_peer(), &frame(0x0999, &[1, 2]))?;
        harness.engine.on_stream_data(
            SOCKET,
            peer(9, 1),
            &frame(FIRE_AND_FORGET_FRAME, &[1]),
        )?;
        Ok(())
    })?;

    let samples = counters(&snapshotter);
    assert_eq!(
        counter_total(&samples, FRAMES_DROPPED, Some(("reason", "unknown_route"))),
        1
    );
    assert_eq!(
        counter_total(&samples, FRAMES_DROPPED, Some(("reason", "peer_mismatch"))),
        1
    );
    Ok(())
}

#[test]
fn rejected_datagrams_are_counted() -> TestResult {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let mut config = datagram_config(&[RemotePattern::exact(default_peer())], standard_routes());
    config.groups[0].trailing = TrailingPolicy::Strict;
    let harness = Harness::new(config)?;
    harness.open_datagram_group()?;
    let mut datagram = frame(FIRE_AND_FORGET_FRAME, &[1]);
    datagram.push(0xFF);

    metrics::with_local_recorder(&recorder, || -> TestResult {
        harness
            .engine
            .on_datagram(SOCKET, default_peer(), &datagram)?;
        harness
            .engine
            .on_datagram(SOCKET, peer(9, 1), &datagram)?;
        Ok(())
    })?;

    let samples = counters(&snapshotter);
    assert_eq!(counter_total(&samples, DATAGRAMS_REJECTED, None), 1);
    assert_eq!(
        counter_total(
            &samples,
            FRAMES_DROPPED,
            Some(("reason", "no_matching_connection"))
        ),
        1
    );
    assert_eq!(
        counter_total(&samples, BYTES_ACKNOWLEDGED, None),
        2 * datagram.len() as u64
    );
    Ok(())
}
