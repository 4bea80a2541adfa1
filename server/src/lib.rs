//! # Chat Server Library
//!
//! This library implements a line-oriented text chat server. Clients connect
//! over TCP, send plain text or slash commands, and receive broadcast and
//! private messages as `\n`-terminated lines.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Every accepted connection becomes a session with a nickname (initially the
//! peer address) and moderation counters. Sessions live in a shared registry
//! from accept until disconnect, and the close sequence runs exactly once.
//!
//! ### Broadcast Fan-out
//! Plain text is broadcast to every session as `<nickname>: <text>`. Private
//! messages, complaints and delayed broadcasts are issued with commands:
//!
//! | Input | Effect |
//! |---|---|
//! | `quit` | disconnect |
//! | `/nick <name>` | rename the sender |
//! | `/pm <nick> <text>` | private message |
//! | `/complaint <nick>` | complain about a session |
//! | `/delay <minutes> <text>` | broadcast later |
//!
//! ### Abuse Mitigation
//! A session that collects three complaints is banned from broadcasting for
//! a configurable number of hours. Independently, a session may broadcast at
//! most twenty messages per hour.
//!
//! ## Architecture Design
//!
//! ### Task per Connection
//! The accept loop spawns one task per client which reads messages and
//! dispatches them. A second task per client owns the socket's write half and
//! drains a bounded queue, so broadcasts never wait on a slow peer and writes
//! to one socket are never interleaved. A peer that lets its queue fill up is
//! disconnected.
//!
//! ### Shared Registry
//! All sessions live in one [`registry::Registry`] behind a
//! `tokio::sync::RwLock`. The lock is held for a single registry call at a
//! time and never across socket I/O.
//!
//! ### Message Framing
//! By default one read of up to 255 bytes is one message, matching the
//! reference chat protocol. [`config::Framing::Line`] switches to reading
//! whole lines instead.
//!
//! ## Module Organization
//!
//! - `command`: parses a received line into a [`command::Command`]
//! - `config`: server settings and TOML loading
//! - `error`: error types
//! - `moderation`: ban and rate-limit decisions
//! - `network`: listener, receive loops, dispatch and disconnect
//! - `registry`: live sessions, broadcast and private delivery
//! - `scheduler`: delayed broadcasts
//! - `session`: per-connection state
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use chat_server::config::ServerConfig;
//! use chat_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(&ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod moderation;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod session;
