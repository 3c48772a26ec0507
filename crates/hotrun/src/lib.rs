//! # hotrun
//!
//! Restart runner for hot-rebuild workflows.
//!
//! A [`Supervisor`] owns one child command: it spawns it with inherited
//! stdio, restarts the whole process tree on demand, and — when the child
//! dies on its own — waits for the next finished build before bringing it
//! back. Restart requests arrive on a control channel fed by a
//! `hotsignal` client and by the stdin watcher in [`stdin`].
//!
//! Pairs with [`hotsignal`] for the signaling transport.

pub mod stdin;
pub mod supervisor;

pub use supervisor::{Control, Supervisor, SupervisorError};
