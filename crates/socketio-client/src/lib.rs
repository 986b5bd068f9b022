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
//! Socket.IO client for Rust.
//!
//! A [`Manager`] owns the engine.io connection to a server and reconnects it when it is lost.
//! Each namespace is reached through a [`Socket`], all of them multiplexed over the same
//! connection. Events are received by registering listeners and sent with
//! [`Socket::emit`], with an optional acknowledgement.
//!
//! ```no_run
//! # use socketio_client::{Event, Manager, config::ClientConfig};
//! # async fn doc() {
//! let config = ClientConfig::builder("http://localhost:3000").build();
//! let manager = Manager::new(config);
//! let socket = manager.socket("/");
//!
//! socket.on("connect", |_| println!("connected"));
//! socket.on("chat", |event: &Event| {
//!     let msg: String = event.data().unwrap();
//!     println!("received {msg}");
//! });
//! manager.on("reconnect_failed", |_| println!("giving up"));
//!
//! socket.emit("chat", "hello").unwrap();
//! # }
//! ```
//!
//! #### Binary data
//! Byte buffers such as `bytes::Bytes` are sent as binary attachments, at any depth of the
//! emitted data. They are received as [`PayloadValue::Binary`] and deserialize
//! as `bytes::Bytes` or `Vec<u8>`.
//!
//! #### Feature flags
//! * `tracing`: enables logs with the [`tracing`](https://docs.rs/tracing) crate.

pub use ack::{AckResponse, AckSender};
pub use emitter::{Event, ListenerId, RESERVED_EVENTS, is_reserved};
pub use errors::{AckError, Error, ParseError, SendError};
pub use manager::Manager;
pub use socket::{DisconnectReason, Socket};
pub use socketio_core::PayloadValue;

pub use engineio_client::{CloseReason, ProtocolVersion, TransportType};

pub mod ack;
pub mod config;

mod emitter;
mod errors;
mod manager;
mod socket;

/// In-memory transports to drive a manager from tests.
#[doc(hidden)]
#[cfg(feature = "__test_harness")]
pub use engineio_client::harness;
