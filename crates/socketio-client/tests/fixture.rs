#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use socketio_client::{
    Event, Manager, ProtocolVersion, Socket,
    config::{ClientConfig, ClientConfigBuilder},
    harness::{MockCall, MockConn, MockServer, mock_transports},
};
use tokio::time::Instant;

pub use engineio_client::{OpenPacket, Packet, Str};

pub fn builder(protocol: ProtocolVersion) -> ClientConfigBuilder {
    ClientConfig::builder("http://localhost:3000").protocol(protocol)
}

pub fn handshake() -> OpenPacket {
    OpenPacket {
        sid: "sid-1".to_string(),
        upgrades: vec![],
        ping_interval: 25000,
        ping_timeout: 20000,
        max_payload: None,
    }
}

/// Create a manager on the mock transports.
pub fn create(config: ClientConfig) -> (Manager, MockServer) {
    init_tracing();
    let (factory, server) = mock_transports();
    (Manager::with_factory(config, factory), server)
}

/// Wait for the manager to open a transport.
pub async fn accept(server: &mut MockServer) -> MockConn {
    let mut conn = server.accept().await.expect("no transport created");
    assert_eq!(conn.next_call().await, Some(MockCall::Open));
    conn
}

/// Wait for the manager to open a transport and complete the handshake.
pub async fn open(server: &mut MockServer) -> MockConn {
    let conn = accept(server).await;
    conn.handshake(handshake());
    settle().await;
    conn
}

/// Let the manager and engine tasks process everything already sent to them.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Receive a socket.io packet from the server.
pub fn recv(conn: &MockConn, msg: impl Into<Str>) {
    conn.packet(Packet::Message(msg.into()));
}

/// The message and binary packets written so far, acknowledging every write.
pub async fn written(conn: &mut MockConn) -> Vec<Packet> {
    let mut packets = Vec::new();
    loop {
        settle().await;
        let mut progress = false;
        while let Some(call) = conn.try_call() {
            if let MockCall::Send(batch) = call {
                packets.extend(
                    batch
                        .into_iter()
                        .filter(|p| matches!(p, Packet::Message(_) | Packet::Binary(_))),
                );
                conn.drain();
                progress = true;
            }
        }
        if !progress {
            return packets;
        }
    }
}

/// The string messages written so far.
pub async fn written_str(conn: &mut MockConn) -> Vec<String> {
    written(conn)
        .await
        .into_iter()
        .filter_map(|p| match p {
            Packet::Message(msg) => Some(msg.to_string()),
            _ => None,
        })
        .collect()
}

/// Wait for the transport to be closed, acknowledging writes meanwhile.
/// Returns the string messages written before the close.
pub async fn written_until_close(conn: &mut MockConn) -> Option<Vec<String>> {
    let wait = async {
        let mut messages = Vec::new();
        loop {
            match conn.next_call().await {
                Some(MockCall::Close) | None => return messages,
                Some(MockCall::Send(batch)) => {
                    messages.extend(batch.into_iter().filter_map(|p| match p {
                        Packet::Message(msg) => Some(msg.to_string()),
                        _ => None,
                    }));
                    conn.drain();
                }
                Some(_) => (),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(1), wait).await.ok()
}

/// Open a v5 connection with a connected socket on `ns`.
pub async fn connected(ns: &str) -> (Manager, Socket, MockServer, MockConn) {
    let (manager, mut server) = create(builder(ProtocolVersion::V4).build());
    let socket = manager.socket(ns);
    let mut conn = open(&mut server).await;
    let connect = match ns {
        "/" => "0".to_string(),
        ns => format!("0{ns},"),
    };
    assert_eq!(written_str(&mut conn).await, [connect]);
    let ack = match ns {
        "/" => r#"0{"sid":"ns-sid"}"#.to_string(),
        ns => format!(r#"0{ns},{{"sid":"ns-sid"}}"#),
    };
    recv(&conn, ack);
    settle().await;
    assert!(socket.connected());
    (manager, socket, server, conn)
}

pub fn describe(event: &Event) -> String {
    match event {
        Event::Reconnect(n) | Event::ReconnectAttempt(n) | Event::Reconnecting(n) => {
            format!("{}:{n}", event.name())
        }
        Event::Disconnect(reason) => format!("disconnect:{reason}"),
        Event::Close(reason) => format!("close:{reason}"),
        Event::Message { event, args, .. } => {
            format!("{event}:{}", serde_json::to_string(args).unwrap())
        }
        _ => event.name().to_string(),
    }
}

/// Records the events emitted to a manager or a socket, with their time.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<(Instant, String)>>>);

impl Recorder {
    pub fn socket(socket: &Socket, events: &[&str]) -> Self {
        let rec = Self::default();
        for event in events {
            let r = rec.clone();
            socket.on(*event, move |e| r.push(e));
        }
        rec
    }

    pub fn manager(manager: &Manager, events: &[&str]) -> Self {
        let rec = Self::default();
        for event in events {
            let r = rec.clone();
            manager.on(*event, move |e| r.push(e));
        }
        rec
    }

    fn push(&self, event: &Event) {
        let entry = (Instant::now(), describe(event));
        self.0.lock().unwrap().push(entry);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    /// The times of the events starting with `prefix`.
    pub fn times(&self, prefix: &str) -> Vec<Instant> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.starts_with(prefix))
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub fn init_tracing() {
    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}
