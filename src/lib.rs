//! An embeddable HTTP/1.1 server engine: connection parsing, a
//! deferred-commit response builder, pluggable responder dispatch with
//! virtual-host routing, and a multi-threaded worker event loop.
//!
//! This crate does not include a CLI, a dynamic module loader, a
//! file-serving responder, or signal handling — those are external
//! collaborators. See `src/bin/demo.rs` for a minimal runnable example.

pub mod address;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod prelude;
pub mod responder;
pub mod server;
pub mod worker;
