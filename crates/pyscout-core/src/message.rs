//! Request and response envelopes exchanged with parser workers.
//!
//! Every frame payload is one JSON object: an optional `id` plus a `type`
//! tag that selects the payload variant. Requests and responses are matched
//! by `id`; a response of type `error` can answer any request. The envelope
//! layer never interprets payloads beyond this.

use serde::{Deserialize, Serialize};

use crate::descriptor::FileDescriptor;

// ============================================================================
// Envelopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Assigned by the dispatcher before the request reaches a socket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

impl WireRequest {
    pub fn new(payload: RequestPayload) -> Self {
        Self { id: None, payload }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    /// Echo of the request id this response answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl WireResponse {
    /// False when the worker answered with an `error` payload.
    pub fn is_successful(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.payload {
            ResponsePayload::Error { message } => Some(message),
            _ => None,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Context for cursor-driven operations: the full buffer contents (which may
/// be newer than the file on disk) and the cursor offset in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub file_path: String,
    pub source_text: String,
    pub cursor_position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestPayload {
    CreateProject {
        project_root: String,
    },
    DestroyProject {
        project_root: String,
    },
    RebuildSymbolIndex {
        project_root: String,
    },
    UpdateSymbolIndex {
        file_path: String,
    },
    ParseFile {
        file_path: String,
        /// Overrides the module name derived from the package layout.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module_name: Option<String>,
    },
    Completion {
        context: SourceContext,
    },
    Tooltip {
        context: SourceContext,
    },
    DefinitionLocation {
        context: SourceContext,
    },
    Search {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol_kind: Option<SymbolKind>,
    },
}

impl RequestPayload {
    /// Wire tag of this request, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestPayload::CreateProject { .. } => "create_project",
            RequestPayload::DestroyProject { .. } => "destroy_project",
            RequestPayload::RebuildSymbolIndex { .. } => "rebuild_symbol_index",
            RequestPayload::UpdateSymbolIndex { .. } => "update_symbol_index",
            RequestPayload::ParseFile { .. } => "parse_file",
            RequestPayload::Completion { .. } => "completion",
            RequestPayload::Tooltip { .. } => "tooltip",
            RequestPayload::DefinitionLocation { .. } => "definition_location",
            RequestPayload::Search { .. } => "search",
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    /// Answers any request whose handler failed.
    Error {
        message: String,
    },
    CreateProjectResponse,
    DestroyProjectResponse,
    RebuildSymbolIndexResponse,
    UpdateSymbolIndexResponse,
    ParseFileResponse {
        file: FileDescriptor,
    },
    CompletionResponse {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        proposals: Vec<Proposal>,
        /// Signature help shown instead of proposals when the cursor sits
        /// inside a call's argument list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        calltip: Option<String>,
    },
    TooltipResponse {
        text: String,
    },
    DefinitionLocationResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    SearchResponse {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        results: Vec<SearchResult>,
    },
}

impl ResponsePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponsePayload::Error { .. } => "error",
            ResponsePayload::CreateProjectResponse => "create_project_response",
            ResponsePayload::DestroyProjectResponse => "destroy_project_response",
            ResponsePayload::RebuildSymbolIndexResponse => "rebuild_symbol_index_response",
            ResponsePayload::UpdateSymbolIndexResponse => "update_symbol_index_response",
            ResponsePayload::ParseFileResponse { .. } => "parse_file_response",
            ResponsePayload::CompletionResponse { .. } => "completion_response",
            ResponsePayload::TooltipResponse { .. } => "tooltip_response",
            ResponsePayload::DefinitionLocationResponse { .. } => "definition_location_response",
            ResponsePayload::SearchResponse { .. } => "search_response",
        }
    }
}

// ============================================================================
// Support Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Instance,
    Class,
    Function,
    Module,
    Keyword,
}

/// One completion proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub name: String,
    pub kind: ProposalKind,
    /// Dotted name of the scope the proposal came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file_path: String,
    pub line: u32,
}

/// One symbol index hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    /// Fully dotted symbol name.
    pub symbol_name: String,
    pub kind: SymbolKind,
    pub line: u32,
}

// ============================================================================
// Tests
// ============================================================================
