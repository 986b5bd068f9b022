//! ## Configuration for the socket.io client
//!
//! ```
//! # use std::time::Duration;
//! # use socketio_client::config::ClientConfig;
//! let config = ClientConfig::builder("http://localhost:3000")
//!     .reconnection_attempts(5)
//!     .reconnection_delay(Duration::from_millis(500))
//!     .build();
//! assert_eq!(config.engine.path, "/socket.io/");
//! assert_eq!(config.reconnection_attempts, Some(5));
//! ```
use std::time::Duration;

use engineio_client::{ProtocolVersion, TransportType, config::EngineConfig};
use socketio_core::PayloadValue;

/// The configuration of a [`Manager`](crate::Manager) and its sockets.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The configuration of the underlying engine.io connection.
    /// Its path defaults to "/socket.io/".
    pub engine: EngineConfig,

    /// Whether to reconnect automatically after a connection loss.
    /// Defaults to true.
    pub reconnection: bool,

    /// The number of reconnection attempts before giving up.
    /// Defaults to `None`: unlimited.
    pub reconnection_attempts: Option<u32>,

    /// The delay of the first reconnection attempt.
    /// Attempt `k` waits `k * reconnection_delay`, capped by [`ClientConfig::reconnection_delay_max`].
    /// Defaults to 1 second.
    pub reconnection_delay: Duration,

    /// The maximum delay between two reconnection attempts.
    /// Defaults to 5 seconds.
    pub reconnection_delay_max: Duration,

    /// The time allowed for the engine.io handshake of a connection attempt.
    /// `None` disables the connect timeout.
    /// Defaults to 20 seconds.
    pub timeout: Option<Duration>,

    /// Whether the manager opens the connection when it is created
    /// and sockets connect to their namespace when they are created.
    /// Defaults to true.
    pub auto_connect: bool,

    /// The default timeout of [`Socket::emit_with_ack`](crate::Socket::emit_with_ack).
    /// Defaults to 5 seconds.
    pub ack_timeout: Duration,

    /// The auth payload sent with every namespace CONNECT packet.
    /// It is only sent under engine.io protocol v4 (socket.io protocol v5).
    pub auth: Option<PayloadValue>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                path: "/socket.io/".to_string(),
                ..Default::default()
            },
            reconnection: true,
            reconnection_attempts: None,
            reconnection_delay: Duration::from_secs(1),
            reconnection_delay_max: Duration::from_secs(5),
            timeout: Some(Duration::from_secs(20)),
            auto_connect: true,
            ack_timeout: Duration::from_secs(5),
            auth: None,
        }
    }
}

impl ClientConfig {
    /// Create a new [`ClientConfigBuilder`] for the given server url.
    pub fn builder(url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(url)
    }

    /// The delay before the reconnection attempt `attempt` (1-indexed).
    pub fn reconnection_delay_for(&self, attempt: u32) -> Duration {
        self.reconnection_delay
            .saturating_mul(attempt)
            .min(self.reconnection_delay_max)
    }

    /// Check if the attempt `attempt` (1-indexed) exceeds the configured maximum.
    pub(crate) fn attempts_exhausted(&self, attempt: u32) -> bool {
        self.reconnection_attempts.is_some_and(|max| attempt > max)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with the default config for the given server url.
    pub fn new(url: impl Into<String>) -> Self {
        let mut config = ClientConfig::default();
        config.engine.url = url.into();
        Self { config }
    }

    /// The path of the socket.io endpoint.
    /// Defaults to "/socket.io/".
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.engine.path = path.into();
        self
    }

    /// Append a query parameter to every engine.io request.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.engine.query.push((key.into(), value.into()));
        self
    }

    /// The engine.io protocol version to speak.
    ///
    /// [`ProtocolVersion::V3`] speaks socket.io protocol v4 and
    /// [`ProtocolVersion::V4`] speaks socket.io protocol v5.
    /// Defaults to [`ProtocolVersion::V3`].
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.engine.protocol = protocol;
        self
    }

    /// The transports to use, in order of preference.
    ///
    /// Defaults to `[TransportType::Polling, TransportType::Websocket]`
    pub fn transports<const N: usize>(mut self, transports: [TransportType; N]) -> Self {
        assert!(N > 0 && N <= 2);
        self.config.engine.transports = transports.to_vec();
        self
    }

    /// Replace the whole engine.io configuration.
    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.config.engine = engine;
        self
    }

    /// Whether to reconnect automatically.
    /// Defaults to true.
    pub fn reconnection(mut self, reconnection: bool) -> Self {
        self.config.reconnection = reconnection;
        self
    }

    /// The number of reconnection attempts before giving up.
    /// Defaults to unlimited.
    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.config.reconnection_attempts = Some(attempts);
        self
    }

    /// The delay of the first reconnection attempt.
    /// Defaults to 1 second.
    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.config.reconnection_delay = delay;
        self
    }

    /// The maximum delay between two reconnection attempts.
    /// Defaults to 5 seconds.
    pub fn reconnection_delay_max(mut self, delay: Duration) -> Self {
        self.config.reconnection_delay_max = delay;
        self
    }

    /// The time allowed for the handshake, `None` to wait forever.
    /// Defaults to 20 seconds.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Whether to connect automatically.
    /// Defaults to true.
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.config.auto_connect = auto_connect;
        self
    }

    /// The default ack timeout.
    /// Defaults to 5 seconds.
    pub fn ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.config.ack_timeout = ack_timeout;
        self
    }

    /// The auth payload sent when connecting to a namespace (protocol v5 only).
    pub fn auth(mut self, auth: impl Into<PayloadValue>) -> Self {
        self.config.auth = Some(auth.into());
        self
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
