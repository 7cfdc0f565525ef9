//! Integration tests for datagram demultiplexing.

mod common;

use common::{
    FIRE_AND_FORGET_FRAME,
    FIRE_AND_FORGET_PDU,
    Harness,
    SOCKET,
    STREAMING_FRAME,
    STREAMING_PDU,
    TestResult,
    datagram_config,
    default_peer,
    peer,
    route,
    standard_routes,
};
use pdumux::{
    ConnectionId,
    DatagramReport,
    LinkPhase,
    ReceptionOutcome,
    RxError,
    SocketId,
    config::RemotePattern,
    route::Contract,
};
use pdumux_testing::{Event, RecordingConsumer, frame, frames};

fn delivered_on(harness: &Harness) -> Vec<ConnectionId> {
    harness
        .consumer
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Deliver { pdu, .. } | Event::Complete { pdu, .. } => Some(pdu.connection),
            _ => None,
        })
        .collect()
}

#[test]
fn every_frame_of_a_datagram_is_delivered() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[RemotePattern::exact(default_peer())],
        standard_routes(),
    ))?;
    harness.open_datagram_group()?;
    let datagram = frames(&[
        (FIRE_AND_FORGET_FRAME, &[1]),
        (STREAMING_FRAME, &[2, 3]),
        (FIRE_AND_FORGET_FRAME, &[]),
    ]);

    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;

    assert_eq!(
        report,
        DatagramReport {
            accepted: true,
            delivered: 3,
            dropped: 0,
        }
    );
    assert_eq!(
        harness.consumer.completed(),
        vec![
            (FIRE_AND_FORGET_PDU, vec![1]),
            (STREAMING_PDU, vec![2, 3]),
            (FIRE_AND_FORGET_PDU, vec![]),
        ]
    );
    assert_eq!(harness.transport.acked(SOCKET), datagram.len());
    Ok(())
}

#[test]
fn lenient_policy_ignores_trailing_bytes() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[RemotePattern::exact(default_peer())],
        standard_routes(),
    ))?;
    harness.open_datagram_group()?;
    let mut datagram = frame(FIRE_AND_FORGET_FRAME, &[7, 7]);
    datagram.extend_from_slice(&[1, 2, 3]);

    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;

    assert!(report.accepted);
    assert_eq!(report.delivered, 1);
    assert_eq!(harness.consumer.completed(), vec![(FIRE_AND_FORGET_PDU, vec![7, 7])]);
    assert_eq!(harness.transport.acked(SOCKET), datagram.len());
    Ok(())
}

#[test]
fn unknown_frames_are_skipped_between_known_ones() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[RemotePattern::exact(default_peer())],
        standard_routes(),
    ))?;
    harness.open_datagram_group()?;
    let datagram = frames(&[(0x0999, &[1, 2]), (FIRE_AND_FORGET_FRAME, &[3])]);

    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;

    assert_eq!(
        report,
        DatagramReport {
            accepted: true,
            delivered: 1,
            dropped: 1,
        }
    );
    assert_eq!(harness.consumer.completed(), vec![(FIRE_AND_FORGET_PDU, vec![3])]);
    Ok(())
}

#[test]
fn datagram_without_known_frame_is_rejected() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[RemotePattern::exact(default_peer())],
        standard_routes(),
    ))?;
    harness.open_datagram_group()?;
    let datagram = frame(0x0999, &[1, 2, 3]);

    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;

    assert_eq!(report, DatagramReport::default());
    assert!(harness.consumer.events().is_empty());
    assert_eq!(harness.transport.acked(SOCKET), datagram.len());
    Ok(())
}

#[test]
fn streaming_frame_without_room_fails_alone() -> TestResult {
    let consumer = RecordingConsumer::default();
    consumer.script_starts([Ok(2)]);
    let harness = Harness::with_consumer(
        datagram_config(&[RemotePattern::exact(default_peer())], standard_routes()),
        consumer,
    )?;
    harness.open_datagram_group()?;
    let datagram = frames(&[(STREAMING_FRAME, &[0; 5]), (FIRE_AND_FORGET_FRAME, &[9])]);

    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;

    assert_eq!((report.delivered, report.dropped), (1, 1));
    assert_eq!(
        harness.consumer.outcomes(),
        vec![(STREAMING_PDU, ReceptionOutcome::Failed)]
    );
    assert_eq!(harness.consumer.completed(), vec![(FIRE_AND_FORGET_PDU, vec![9])]);
    assert_eq!(harness.transport.acked(SOCKET), datagram.len());
    Ok(())
}

#[test]
fn wildcard_member_binds_first_peer() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[RemotePattern::wildcard()],
        standard_routes(),
    ))?;
    let connections = harness.open_datagram_group()?;
    assert_eq!(
        harness.engine.link_phase(connections[0])?,
        LinkPhase::Connecting
    );
    let datagram = frame(FIRE_AND_FORGET_FRAME, &[1]);

    harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;
    let report = harness
        .engine
        .on_datagram(SOCKET, peer(5, 13400), &datagram)?;

    assert_eq!(report, DatagramReport::default());
    assert_eq!(
        harness.engine.link_phase(connections[0])?,
        LinkPhase::Online
    );
    assert_eq!(harness.consumer.completed().len(), 1);
    assert_eq!(harness.transport.acked(SOCKET), 2 * datagram.len());
    Ok(())
}

#[test]
fn unbound_wildcard_accepts_every_peer() -> TestResult {
    let mut config = datagram_config(&[RemotePattern::wildcard()], standard_routes());
    config.groups[0].connections[0].bind_remote = false;
    let harness = Harness::new(config)?;
    harness.open_datagram_group()?;
    let datagram = frame(FIRE_AND_FORGET_FRAME, &[1]);

    harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;
    harness
        .engine
        .on_datagram(SOCKET, peer(5, 13400), &datagram)?;

    assert_eq!(harness.consumer.completed().len(), 2);
    Ok(())
}

#[test]
fn closed_members_are_not_candidates() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[
            RemotePattern::exact(default_peer()),
            RemotePattern::wildcard(),
        ],
        standard_routes(),
    ))?;
    let group = harness.engine.group_id("udp").ok_or("udp group missing")?;
    harness.engine.open_connection(ConnectionId::new(1))?;
    harness.engine.bind_datagram_socket(group, SOCKET)?;

    harness.engine.on_datagram(
        SOCKET,
        default_peer(),
        &frame(FIRE_AND_FORGET_FRAME, &[1]),
    )?;

    assert_eq!(delivered_on(&harness), vec![ConnectionId::new(1)]);
    Ok(())
}

#[test]
fn members_without_routes_are_skipped() -> TestResult {
    let mut config = datagram_config(
        &[
            RemotePattern::exact(default_peer()),
            RemotePattern::wildcard(),
        ],
        Vec::new(),
    );
    config.groups[0].connections[1].routes = standard_routes();
    let harness = Harness::new(config)?;
    harness.open_datagram_group()?;

    harness.engine.on_datagram(
        SOCKET,
        default_peer(),
        &frame(FIRE_AND_FORGET_FRAME, &[1]),
    )?;

    assert_eq!(delivered_on(&harness), vec![ConnectionId::new(1)]);
    Ok(())
}

#[test]
fn released_member_keeps_group_socket() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[RemotePattern::exact(default_peer())],
        standard_routes(),
    ))?;
    let connections = harness.open_datagram_group()?;
    let datagram = frame(FIRE_AND_FORGET_FRAME, &[1]);

    harness.engine.release_connection(connections[0])?;
    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;
    assert_eq!(report, DatagramReport::default());

    harness.engine.open_connection(connections[0])?;
    assert_eq!(
        harness.engine.link_phase(connections[0])?,
        LinkPhase::Online
    );
    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), &datagram)?;

    assert_eq!(report.delivered, 1);
    assert_eq!(harness.transport.acked(SOCKET), 2 * datagram.len());
    Ok(())
}

#[test]
fn headerless_datagram_is_one_pdu() -> TestResult {
    let mut config = datagram_config(
        &[RemotePattern::exact(default_peer())],
        vec![route(FIRE_AND_FORGET_FRAME, Contract::FireAndForget, 5)],
    );
    config.groups[0].header_mode = false;
    let harness = Harness::new(config)?;
    harness.open_datagram_group()?;

    let report = harness
        .engine
        .on_datagram(SOCKET, default_peer(), b"raw payload")?;

    assert_eq!(report.delivered, 1);
    assert_eq!(harness.consumer.completed(), vec![(5, b"raw payload".to_vec())]);
    Ok(())
}

#[test]
fn stream_socket_is_not_a_datagram_socket() -> TestResult {
    let harness = Harness::new(datagram_config(
        &[RemotePattern::exact(default_peer())],
        standard_routes(),
    ))?;
    let stray = SocketId::new(3);

    let err = harness
        .engine
        .on_datagram(stray, default_peer(), &[0; 5])
        .expect_err("socket is not attached");

    assert_eq!(err, RxError::UnknownSocket(stray));
    assert_eq!(harness.transport.acked(stray), 5);
    Ok(())
}
