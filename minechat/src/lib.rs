//! Client for a line-oriented chat server that splits traffic over two TCP
//! streams: a read-only broadcast stream and a command stream used to log in
//! and post.
//!
//! - [`session`] owns the connection lifecycle: connect, authenticate, run
//!   the active cohort, tear it down and retry after a fixed delay.
//! - [`auth`] drives the login and registration handshake.
//! - [`liveness`] holds the keepalive and the watchdog.
//! - [`protocol`] classifies server text and frames outgoing lines.
//! - [`channels`] and [`events`] form the boundary to any presentation layer;
//!   [`console`] is the terminal one shipped with the binary.
//! - [`history`] appends received chat to a file.
//! - [`oneshot`] covers registration, single posts, and read-only logging.
//! - [`connector`] opens the two streams; tests swap in in-memory ones.
//! - [`cli`] parses the command line.

pub mod auth;
pub mod channels;
pub mod cli;
pub mod connector;
pub mod console;
pub mod error;
pub mod events;
pub mod history;
pub mod liveness;
pub mod oneshot;
pub mod protocol;
pub mod session;
