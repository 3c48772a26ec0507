//! # hotsignal
//!
//! Local signaling channel for hot-rebuild workflows.
//!
//! One process (the build observer) runs a [`RelayServer`] on a named
//! [`Channel`] and broadcasts [`Event::BuildEmitted`] when a build cycle
//! completes. Any number of [`RelayClient`]s connect to the same channel,
//! react to events, and can emit events themselves — a client's own message
//! is relayed to every other client but never echoed back to it.
//!
//! The wire protocol is deliberately minimal: each message is the bare
//! event-kind literal as UTF-8 with no framing, payload, or terminator.
//! Anything else on the wire is relayed by the server and ignored by
//! clients.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hotsignal::{Channel, Event, RelayClient};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = RelayClient::new(Channel::new("myapp"));
//! client.on(Event::BuildEmitted, || println!("build finished"));
//! client.connect();
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod event;
pub mod observer;
pub mod server;

pub use channel::Channel;
pub use client::{ClientError, RelayClient};
pub use event::Event;
pub use observer::BuildObserver;
pub use server::{RelayServer, ServerError};
