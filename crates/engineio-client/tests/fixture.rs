#![allow(dead_code)]

use std::time::Duration;

use engineio_client::{
    EngineEvent, EngineEvents, EngineSocket, OpenPacket, ProtocolVersion, TransportType,
    config::EngineConfig,
    harness::{MockCall, MockConn, MockServer, mock_transports},
};

pub const PING_INTERVAL: Duration = Duration::from_millis(25000);
pub const PING_TIMEOUT: Duration = Duration::from_millis(5000);

pub fn handshake(upgrades: &[&str]) -> OpenPacket {
    OpenPacket {
        sid: "sid-1".to_string(),
        upgrades: upgrades.iter().map(|u| u.to_string()).collect(),
        ping_interval: PING_INTERVAL.as_millis() as u64,
        ping_timeout: PING_TIMEOUT.as_millis() as u64,
        max_payload: None,
    }
}

pub fn config(protocol: ProtocolVersion) -> EngineConfig {
    EngineConfig::builder("http://localhost:3000")
        .protocol(protocol)
        .build()
}

/// Next event, skipping the raw packet events.
pub async fn next_event(events: &mut EngineEvents) -> EngineEvent {
    loop {
        match events.recv().await {
            Some(EngineEvent::Packet(_)) => continue,
            Some(event) => return event,
            None => panic!("event stream ended"),
        }
    }
}

/// Let the socket task process everything already sent to it.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Open a socket on the mock transports and complete the handshake on the first transport.
pub async fn open_socket(
    config: EngineConfig,
    upgrades: &[&str],
) -> (EngineSocket, EngineEvents, MockServer, MockConn) {
    init_tracing();
    let (factory, mut server) = mock_transports();
    let (socket, mut events) = EngineSocket::open_with(config, factory);
    let mut conn = server.accept().await.expect("no transport created");
    assert_eq!(conn.next_call().await, Some(MockCall::Open));
    conn.handshake(handshake(upgrades));
    match next_event(&mut events).await {
        EngineEvent::Open(open) => assert_eq!(open.sid, "sid-1"),
        event => panic!("unexpected event {event:?}"),
    }
    (socket, events, server, conn)
}

/// Drive a websocket probe up to the probe pong.
pub async fn probe_until_pong(server: &mut MockServer) -> MockConn {
    let mut probe = server.accept().await.expect("no probe created");
    assert_eq!(probe.kind, TransportType::Websocket);
    assert_eq!(probe.opts.sid.as_deref(), Some("sid-1"));
    assert_eq!(probe.next_call().await, Some(MockCall::Open));
    probe.open();
    assert_eq!(
        probe.next_call().await,
        Some(MockCall::Send(vec![engineio_client::Packet::PingUpgrade]))
    );
    probe.drain();
    probe
}

pub fn init_tracing() {
    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}
