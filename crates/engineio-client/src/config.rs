//! ## Configuration for the engine.io client
//!
//! ```
//! # use engineio_client::config::EngineConfig;
//! # use engineio_client::{ProtocolVersion, TransportType};
//! let config = EngineConfig::builder("http://localhost:3000")
//!     .protocol(ProtocolVersion::V4)
//!     .transports([TransportType::Websocket])
//!     .query("token", "abc")
//!     .build();
//! assert_eq!(config.path, "/engine.io/");
//! ```
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use engineio_core::{ProtocolVersion, TransportType};

/// Records whether a previous connection managed to upgrade to websocket.
///
/// It is shared between every clone of a config, so that a reconnection
/// built from the same config can start directly on websocket
/// when [`EngineConfig::remember_upgrade`] is set.
#[derive(Debug, Clone, Default)]
pub struct UpgradeMemory(Arc<AtomicBool>);

impl UpgradeMemory {
    /// Whether a previous connection succeeded over websocket.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
    pub(crate) fn set(&self, value: bool) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// The configuration of an engine.io connection.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The base url of the server, e.g. `http://localhost:3000`.
    pub url: String,

    /// The path of the engine.io endpoint.
    /// Defaults to "/engine.io/".
    pub path: String,

    /// Extra query parameters appended to every request.
    pub query: Vec<(String, String)>,

    /// The engine.io protocol version to speak.
    /// Defaults to [`ProtocolVersion::V3`].
    pub protocol: ProtocolVersion,

    /// The transports to use, in order of preference.
    /// The first one opens the connection, the others are upgrade candidates.
    ///
    /// Defaults to `[TransportType::Polling, TransportType::Websocket]`
    pub transports: Vec<TransportType>,

    /// Whether to probe the upgrades offered by the server.
    /// Defaults to true.
    pub upgrade: bool,

    /// Start directly on websocket if a previous connection managed to upgrade.
    /// Defaults to false.
    pub remember_upgrade: bool,

    /// Memory of previous successful upgrades.
    pub upgrade_memory: UpgradeMemory,

    /// The maximum number of bytes accepted in a single polling response.
    /// Defaults to 100mb.
    pub max_payload: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost".to_string(),
            path: "/engine.io/".to_string(),
            query: Vec::new(),
            protocol: ProtocolVersion::default(),
            transports: vec![TransportType::Polling, TransportType::Websocket],
            upgrade: true,
            remember_upgrade: false,
            upgrade_memory: UpgradeMemory::default(),
            max_payload: 1e8 as u64, // 100mb
        }
    }
}

impl EngineConfig {
    /// Create a new [`EngineConfigBuilder`] for the given server url.
    pub fn builder(url: impl Into<String>) -> EngineConfigBuilder {
        EngineConfigBuilder::new(url)
    }

    /// Check if a [`TransportType`] is enabled in the [`EngineConfig`]
    #[inline(always)]
    pub fn allowed_transport(&self, transport: TransportType) -> bool {
        self.transports.contains(&transport)
    }

    /// The transport used to open a new connection.
    pub fn initial_transport(&self) -> TransportType {
        if self.remember_upgrade
            && self.upgrade_memory.get()
            && self.allowed_transport(TransportType::Websocket)
        {
            TransportType::Websocket
        } else {
            self.transports
                .first()
                .copied()
                .unwrap_or(TransportType::Polling)
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with the default config for the given server url.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            config: EngineConfig {
                url: url.into(),
                ..Default::default()
            },
        }
    }

    /// The path of the engine.io endpoint.
    /// Defaults to "/engine.io/".
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Append a query parameter to every request.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.query.push((key.into(), value.into()));
        self
    }

    /// The engine.io protocol version to speak.
    /// Defaults to [`ProtocolVersion::V3`].
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// The transports to use, in order of preference.
    ///
    /// The `transports` array should have a size of 1 or 2
    ///
    /// Defaults to :
    /// `[TransportType::Polling, TransportType::Websocket]`
    pub fn transports<const N: usize>(mut self, transports: [TransportType; N]) -> Self {
        assert!(N > 0 && N <= 2);
        self.config.transports = transports.to_vec();
        self
    }

    /// Whether to probe the upgrades offered by the server.
    /// Defaults to true.
    pub fn upgrade(mut self, upgrade: bool) -> Self {
        self.config.upgrade = upgrade;
        self
    }

    /// Start directly on websocket if a previous connection managed to upgrade.
    /// Defaults to false.
    pub fn remember_upgrade(mut self, remember_upgrade: bool) -> Self {
        self.config.remember_upgrade = remember_upgrade;
        self
    }

    /// The maximum number of bytes accepted in a single polling response.
    /// Defaults to 100mb.
    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.max_payload = max_payload;
        self
    }

    /// Build the config
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
