//! Tests for the periodic continuation driver.

mod common;

use std::{sync::Arc, time::Duration};

use common::{
    CONSUMER,
    Harness,
    SOCKET,
    STREAMING_FRAME,
    STREAMING_PDU,
    TestResult,
    default_peer,
    standard_routes,
    stream_config,
};
use pdumux::{ConnectionId, RxEngine, run_continuation_driver};
use pdumux_testing::{RecordingConsumer, RecordingTransport, frame};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn driver_resumes_parked_data() -> TestResult {
    let consumer = Arc::new(RecordingConsumer::with_budget(2));
    let transport = Arc::new(RecordingTransport::default());
    let engine = Arc::new(
        RxEngine::builder(stream_config(standard_routes()))
            .streaming_consumer(CONSUMER, consumer.clone())
            .fire_and_forget_consumer(CONSUMER, consumer.clone())
            .transport(transport.clone())
            .build()?,
    );
    let connection = ConnectionId::new(0);
    engine.open_connection(connection)?;
    engine.connect_stream(connection, SOCKET, default_peer())?;
    let bytes = frame(STREAMING_FRAME, &[1, 2, 3, 4, 5, 6]);
    engine.on_stream_data(SOCKET, default_peer(), &bytes)?;
    assert!(engine.has_buffered_data(connection));

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(run_continuation_driver(
        Arc::clone(&engine),
        Duration::from_millis(10),
        shutdown.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert!(engine.has_buffered_data(connection));

    consumer.unlimit();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!engine.has_buffered_data(connection));
    assert_eq!(consumer.completed(), vec![(STREAMING_PDU, vec![1, 2, 3, 4, 5, 6])]);
    assert_eq!(transport.acked(SOCKET), bytes.len());

    shutdown.cancel();
    task.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn driver_stops_on_shutdown() -> TestResult {
    let harness = Harness::with_consumer(
        stream_config(standard_routes()),
        RecordingConsumer::with_budget(0),
    )?;
    let engine = Arc::new(harness.engine);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    tokio::time::timeout(
        Duration::from_secs(1),
        run_continuation_driver(engine, Duration::from_millis(10), shutdown),
    )
    .await?;
    Ok(())
}
