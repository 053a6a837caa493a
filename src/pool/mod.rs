//! Out-of-process Python workers.
//!
//! The pool launches N interpreter processes, each running the embedded
//! worker script, and hands them requests over per-worker Unix sockets with
//! length-prefixed JSON frames. A single dispatch task owns all state:
//! worker lifecycles, the request queue used while no worker is connected
//! yet, routing (round-robin for parsing, one pinned worker for everything
//! project-scoped), and the id table that matches responses back to their
//! [`Reply`] handles. Workers that exit or corrupt their stream are taken
//! out of rotation; the rest of the pool keeps serving.

mod channel;
mod client;
mod dispatcher;
mod reply;
mod supervisor;
mod worker;

pub use client::WorkerPool;
pub use reply::Reply;
