//! Tests for the engine socket lifecycle and write buffer
mod fixture;
mod utils;

use engineio_client::{
    CloseReason, EngineEvent, EngineSocket, Packet, ProtocolVersion, TransportType,
    harness::{MockCall, mock_transports},
};
use fixture::{config, handshake, next_event, open_socket, settle};
use smallvec::smallvec;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn handshake_and_messages() {
    let (_socket, mut events, _server, conn) = open_socket(config(ProtocolVersion::V3), &[]).await;
    assert_eq!(conn.kind, TransportType::Polling);

    conn.packet(Packet::Message("hello".into()));
    conn.packet(Packet::Binary(vec![1, 2, 3].into()));
    match next_event(&mut events).await {
        EngineEvent::Message(msg) => assert_eq!(msg, "hello"),
        event => panic!("unexpected event {event:?}"),
    }
    match next_event(&mut events).await {
        EngineEvent::Binary(data) => assert_eq!(&data[..], &[1, 2, 3]),
        event => panic!("unexpected event {event:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn raw_packet_event_first() {
    let (_socket, mut events, _server, conn) = open_socket(config(ProtocolVersion::V3), &[]).await;
    conn.packet(Packet::Message("hello".into()));
    match assert_some!(events.recv().await) {
        EngineEvent::Packet(Packet::Message(msg)) => assert_eq!(msg, "hello"),
        event => panic!("unexpected event {event:?}"),
    }
    assert!(matches!(
        assert_some!(events.recv().await),
        EngineEvent::Message(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn write_order_is_preserved() {
    let (socket, mut events, _server, mut conn) =
        open_socket(config(ProtocolVersion::V3), &[]).await;

    assert_ok!(socket.emit("1"));
    assert_eq!(
        conn.next_call().await,
        Some(MockCall::Send(vec![Packet::Message("1".into())]))
    );

    // The transport is not writable until drained
    let mut done = assert_ok!(socket.send_with_callback(smallvec![Packet::Message("2".into())]));
    assert_ok!(socket.emit("3"));
    assert_ok!(socket.emit_binary(vec![4]));
    settle().await;
    assert_eq!(conn.try_call(), None);

    conn.drain();
    assert_eq!(
        conn.next_call().await,
        Some(MockCall::Send(vec![
            Packet::Message("2".into()),
            Packet::Message("3".into()),
            Packet::Binary(vec![4].into()),
        ]))
    );
    settle().await;
    assert!(done.try_recv().is_err());

    conn.drain();
    assert_ok!(done.await);
    assert!(matches!(next_event(&mut events).await, EngineEvent::Drain));
}

#[tokio::test(start_paused = true)]
async fn send_many_is_flushed_in_one_batch() {
    let (socket, _events, _server, mut conn) = open_socket(config(ProtocolVersion::V4), &[]).await;
    let packets = smallvec![
        Packet::Message("451-[\"event\",{\"_placeholder\":true,\"num\":0}]".into()),
        Packet::Binary(vec![1].into()),
    ];
    assert_ok!(socket.send_many(packets));
    assert_eq!(
        conn.next_call().await,
        Some(MockCall::Send(vec![
            Packet::Message("451-[\"event\",{\"_placeholder\":true,\"num\":0}]".into()),
            Packet::Binary(vec![1].into()),
        ]))
    );
}

#[tokio::test(start_paused = true)]
async fn packets_sent_before_open_are_buffered() {
    let (factory, mut server) = mock_transports();
    let (socket, mut events) = EngineSocket::open_with(config(ProtocolVersion::V3), factory);
    assert_ok!(socket.emit("early"));
    let mut conn = assert_some!(server.accept().await);
    assert_eq!(conn.next_call().await, Some(MockCall::Open));
    settle().await;
    assert_eq!(conn.try_call(), None);

    conn.handshake(handshake(&[]));
    assert_eq!(
        conn.next_call().await,
        Some(MockCall::Send(vec![Packet::Message("early".into())]))
    );
    assert!(matches!(next_event(&mut events).await, EngineEvent::Open(_)));
}

#[tokio::test(start_paused = true)]
async fn graceful_close_waits_for_drain() {
    let (socket, mut events, _server, mut conn) =
        open_socket(config(ProtocolVersion::V3), &[]).await;
    assert_ok!(socket.emit("1"));
    assert_eq!(
        conn.next_call().await,
        Some(MockCall::Send(vec![Packet::Message("1".into())]))
    );
    socket.close();
    settle().await;
    assert_eq!(conn.try_call(), None);

    conn.drain();
    assert_eq!(conn.next_call().await, Some(MockCall::Send(vec![Packet::Close])));
    assert_eq!(conn.next_call().await, Some(MockCall::Close));
    assert!(matches!(next_event(&mut events).await, EngineEvent::Drain));
    assert!(matches!(
        next_event(&mut events).await,
        EngineEvent::Close(CloseReason::ForcedClose)
    ));
    assert!(events.recv().await.is_none());
    assert!(socket.is_closed());
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_closes_after_drain() {
    let (socket, mut events, _server, mut conn) =
        open_socket(config(ProtocolVersion::V4), &[]).await;
    assert_ok!(socket.emit("1"));
    assert_eq!(
        conn.next_call().await,
        Some(MockCall::Send(vec![Packet::Message("1".into())]))
    );
    drop(socket);

    // The paused clock only advances while the socket task is idle
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(conn.try_call(), None);

    conn.drain();
    assert_eq!(conn.next_call().await, Some(MockCall::Send(vec![Packet::Close])));
    assert_eq!(conn.next_call().await, Some(MockCall::Close));
    assert!(matches!(next_event(&mut events).await, EngineEvent::Drain));
    assert!(matches!(
        next_event(&mut events).await,
        EngineEvent::Close(CloseReason::ForcedClose)
    ));
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let (socket, mut events, _server, _conn) = open_socket(config(ProtocolVersion::V3), &[]).await;
    socket.close();
    socket.close();
    assert!(matches!(
        next_event(&mut events).await,
        EngineEvent::Close(CloseReason::ForcedClose)
    ));
    assert!(events.recv().await.is_none());
    assert!(socket.emit("late").is_err());
}

#[tokio::test(start_paused = true)]
async fn transport_close_discards_write_buffer() {
    let (socket, mut events, _server, mut conn) =
        open_socket(config(ProtocolVersion::V3), &[]).await;
    assert_ok!(socket.emit("1"));
    assert_some!(conn.next_call().await);
    let done = assert_ok!(socket.send_with_callback(smallvec![Packet::Message("2".into())]));
    settle().await;

    conn.close();
    assert!(matches!(
        next_event(&mut events).await,
        EngineEvent::Close(CloseReason::TransportClose)
    ));
    assert!(done.await.is_err());
    assert_eq!(conn.next_call().await, Some(MockCall::Close));
}

#[tokio::test(start_paused = true)]
async fn only_first_error_closes() {
    let (_socket, mut events, _server, mut conn) =
        open_socket(config(ProtocolVersion::V3), &[]).await;
    conn.error();
    conn.error();
    assert!(matches!(next_event(&mut events).await, EngineEvent::Error(_)));
    assert!(matches!(
        next_event(&mut events).await,
        EngineEvent::Close(CloseReason::TransportError)
    ));
    assert!(events.recv().await.is_none());
    assert_eq!(conn.next_call().await, Some(MockCall::Close));
}

#[tokio::test(start_paused = true)]
async fn close_while_opening() {
    let (factory, mut server) = mock_transports();
    let (socket, mut events) = EngineSocket::open_with(config(ProtocolVersion::V3), factory);
    let mut conn = assert_some!(server.accept().await);
    socket.close();
    assert!(matches!(
        next_event(&mut events).await,
        EngineEvent::Close(CloseReason::ForcedClose)
    ));
    assert_eq!(conn.next_call().await, Some(MockCall::Open));
    assert_eq!(conn.next_call().await, Some(MockCall::Close));

    // The handshake of a closed attempt is ignored
    conn.handshake(handshake(&[]));
    assert!(events.recv().await.is_none());
}
