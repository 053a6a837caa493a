//! pyscout-core: pure infrastructure for the pyscout code intelligence engine.
//!
//! Everything in this crate is independent of the process and transport
//! machinery in the root crate:
//!
//! - [`frame`]: length-prefixed wire framing with incremental decode
//! - [`message`]: request/response envelopes exchanged with parser workers
//! - [`descriptor`]: the serialized shape of a parsed Python module
//! - [`scope`]: the in-memory scope tree built from descriptors
//! - [`model`]: the multi-file code model and its dotted-name index
//! - [`resolve`]: static type resolution over the code model
//! - [`cursor`]: extraction of the dotted expression under a cursor

pub mod cursor;
pub mod descriptor;
pub mod frame;
pub mod message;
pub mod model;
pub mod resolve;
pub mod scope;

pub use cursor::CursorContext;
pub use descriptor::{
    FileDescriptor, Position, ReferenceKind, ScopeDescriptor, ScopeKind, TypeDescriptor,
    TypeReference, VariableDescriptor, VariableKind,
};
pub use frame::{FrameError, Framer};
pub use message::{
    Location, Proposal, ProposalKind, RequestPayload, ResponsePayload, SearchResult, SourceContext,
    SymbolKind, WireRequest, WireResponse,
};
pub use model::CodeModel;
pub use resolve::{ScopePair, TypeResolver};
pub use scope::{File, IconKind, ScopeId, ScopeRef};
