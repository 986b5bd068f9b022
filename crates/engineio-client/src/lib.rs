#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
//! Engine.IO client for Rust.
//!
//! It opens a connection with a handshake over http long-polling, keeps it alive with
//! the heartbeat mechanism and upgrades it to websocket when the server allows it.
//!
//! ```no_run
//! # use engineio_client::{config::EngineConfig, socket::{EngineSocket, EngineEvent}};
//! # async fn doc() {
//! let config = EngineConfig::builder("http://localhost:3000").build();
//! let (socket, mut events) = EngineSocket::open(config);
//! while let Some(event) = events.recv().await {
//!     match event {
//!         EngineEvent::Open(_) => socket.emit("hello").unwrap(),
//!         EngineEvent::Message(msg) => println!("received {msg}"),
//!         EngineEvent::Close(reason) => println!("closed: {reason}"),
//!         _ => (),
//!     }
//! }
//! # }
//! ```

pub use engineio_core::{
    OpenPacket, Packet, PacketBuf, PacketParseError, ProtocolVersion, Str, TransportType,
};
pub use errors::{Error, TransportError};
pub use socket::{CloseReason, EngineEvent, EngineEvents, EngineSocket};

pub mod config;
pub mod socket;
pub mod transport;

mod errors;

#[doc(hidden)]
#[cfg(feature = "__test_harness")]
pub mod harness;
