//! pyscout: Python code intelligence with out-of-process parser workers.
//!
//! Parsing and indexing run in a pool of Python worker processes speaking a
//! length-prefixed JSON protocol over per-worker Unix domain sockets. The
//! results feed a scope model in this process, which answers completion,
//! hover and declaration lookup without further round trips.

#[cfg(not(unix))]
compile_error!("pyscout drives its workers over Unix domain sockets and only builds on Unix");

// Scope model, wire types and framing - re-exported from pyscout-core
pub use pyscout_core::cursor;
pub use pyscout_core::descriptor;
pub use pyscout_core::frame;
pub use pyscout_core::message;
pub use pyscout_core::model;
pub use pyscout_core::resolve;
pub use pyscout_core::scope;

// Engine configuration and errors
pub mod config;
pub mod error;

// Worker processes and the transport to them
pub mod pool;
pub mod pyenv;
pub mod pyworker;

// Editor-facing operations over the pool and the model
pub mod session;
