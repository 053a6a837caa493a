//! The editor-facing session.
//!
//! A [`Session`] ties the worker pool to an in-process [`CodeModel`]. Files
//! are parsed remotely and ingested into the model; completion, tooltips and
//! go-to-definition then run locally against the model so they stay fast and
//! available even while workers are busy. Project-wide symbol search goes to
//! the workers, which keep the on-disk index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use pyscout_core::cursor::context_at;
use pyscout_core::descriptor::{
    ReferenceKind, ScopeKind, TypeReference, VariableDescriptor, VariableKind,
};
use pyscout_core::message::{Location, ResponsePayload, SearchResult, SymbolKind};
use pyscout_core::model::CodeModel;
use pyscout_core::resolve::TypeResolver;
use pyscout_core::scope::{File, IconKind, ScopeRef};

use crate::error::{PyscoutError, PyscoutResult};
use crate::pool::WorkerPool;

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

// ============================================================================
// Completion items
// ============================================================================

/// One local completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub text: String,
    pub icon: IconKind,
    /// For scope members the enclosing dotted name, for variables their
    /// possible type ids.
    pub detail: Option<String>,
}

// ============================================================================
// Session
// ============================================================================

pub struct Session {
    pool: WorkerPool,
    model: CodeModel,
    /// Files the model holds, grouped by the project root they came from.
    projects: HashMap<String, HashSet<String>>,
}

impl Session {
    pub fn new(pool: WorkerPool) -> Session {
        Session {
            pool,
            model: CodeModel::new(),
            projects: HashMap::new(),
        }
    }

    pub fn model(&self) -> &CodeModel {
        &self.model
    }

    /// Registers a project with the workers and builds its symbol index.
    pub async fn open_project(&mut self, project_root: impl Into<String>) -> PyscoutResult<()> {
        let project_root = project_root.into();
        self.pool
            .create_project(&project_root)
            .expect_success()
            .await?;
        self.pool
            .rebuild_symbol_index(&project_root)
            .expect_success()
            .await?;
        info!(project = %project_root, "project opened");
        self.projects.entry(project_root).or_default();
        Ok(())
    }

    /// Drops a project from the workers and from the local model. The worker
    /// side is told asynchronously; nothing waits on its answer.
    pub fn close_project(&mut self, project_root: &str) {
        drop(self.pool.destroy_project(project_root));
        if let Some(files) = self.projects.remove(project_root) {
            for file_path in files {
                self.model.remove(&file_path);
            }
        }
        info!(project = %project_root, "project closed");
    }

    /// Parses a file in a worker and ingests the result into the model.
    pub async fn analyze_file(
        &mut self,
        file_path: impl Into<String>,
        module_name: Option<String>,
    ) -> PyscoutResult<Arc<File>> {
        let file_path = file_path.into();
        let response = self
            .pool
            .parse_file(&file_path, module_name)
            .expect_success()
            .await?;
        let descriptor = match response.payload {
            ResponsePayload::ParseFileResponse { file } => file,
            other => {
                return Err(PyscoutError::transport(format!(
                    "unexpected response to parse_file: {}",
                    other.kind()
                )))
            }
        };
        self.track_file(&file_path);
        Ok(self.model.ingest(descriptor))
    }

    /// Reparses a changed file and refreshes its entry in the worker-side
    /// symbol index.
    pub async fn refresh_file(&mut self, file_path: &str) -> PyscoutResult<Arc<File>> {
        let file = self.analyze_file(file_path, None).await?;
        self.pool
            .update_symbol_index(file_path)
            .expect_success()
            .await?;
        Ok(file)
    }

    /// Removes a deleted file from the local model.
    pub fn remove_file(&mut self, file_path: &str) {
        self.model.remove(file_path);
        for files in self.projects.values_mut() {
            files.remove(file_path);
        }
    }

    /// Project-wide symbol search over the worker-side index.
    pub async fn search(
        &self,
        query: impl Into<String>,
        file_path: Option<String>,
        symbol_kind: Option<SymbolKind>,
    ) -> PyscoutResult<Vec<SearchResult>> {
        let response = self
            .pool
            .search(query, file_path, symbol_kind)
            .expect_success()
            .await?;
        match response.payload {
            ResponsePayload::SearchResponse { results } => Ok(results),
            other => Err(PyscoutError::transport(format!(
                "unexpected response to search: {}",
                other.kind()
            ))),
        }
    }

    /// Completion candidates at a character position in `source`, computed
    /// from the local model.
    pub fn completions_at(
        &self,
        file_path: &str,
        source: &str,
        position: usize,
    ) -> Vec<CompletionItem> {
        completions(&self.model, file_path, source, position)
    }

    /// A short description of the thing under the cursor, if it resolves.
    pub fn tooltip_at(&self, file_path: &str, source: &str, position: usize) -> Option<String> {
        tooltip(&self.model, file_path, source, position)
    }

    /// Where the thing under the cursor is declared, if it resolves.
    pub fn definition_at(&self, file_path: &str, source: &str, position: usize) -> Option<Location> {
        definition(&self.model, file_path, source, position)
    }

    /// Stops the worker pool. Call this before dropping a long-lived session
    /// so worker teardown is not left to the background.
    pub async fn shutdown(self) -> PyscoutResult<()> {
        self.pool.shutdown().await
    }

    fn track_file(&mut self, file_path: &str) {
        let project = self
            .projects
            .keys()
            .filter(|root| file_path.starts_with(&format!("{root}/")))
            .max_by_key(|root| root.len())
            .cloned();
        match project {
            Some(root) => {
                if let Some(files) = self.projects.get_mut(&root) {
                    files.insert(file_path.to_string());
                }
            }
            None => debug!(file = file_path, "file does not belong to an open project"),
        }
    }
}

// ============================================================================
// Local code intelligence
// ============================================================================

/// Resolves the cursor's scope context: the module scope of the file plus the
/// innermost scope whose body contains the cursor line.
fn scopes_at(
    model: &CodeModel,
    file_path: &str,
    source: &str,
    position: usize,
    line_indent: u32,
) -> Option<(ScopeRef, ScopeRef)> {
    let file = model.file_by_path(file_path)?;
    let globals = file.root_ref();
    let line = line_of(source, position);
    let locals = globals.find_local_scope(line, line_indent);
    Some((locals, globals))
}

/// Each scope followed by its recursively resolved base classes.
fn with_base_scopes(resolver: &TypeResolver<'_>, scopes: &[ScopeRef]) -> Vec<ScopeRef> {
    let mut expanded = Vec::new();
    for scope in scopes {
        expanded.extend(resolver.scope_with_bases(scope, &scope.module()));
    }
    expanded
}

fn completions(
    model: &CodeModel,
    file_path: &str,
    source: &str,
    position: usize,
) -> Vec<CompletionItem> {
    let Some(context) = context_at(source, position) else {
        return Vec::new();
    };
    let Some((locals, globals)) = scopes_at(model, file_path, source, position, context.line_indent)
    else {
        return Vec::new();
    };

    let resolver = TypeResolver::new(model);
    let mut scopes = vec![locals.clone()];
    if !locals.same_scope(&globals) {
        scopes.push(globals.clone());
    }
    let mut scopes = with_base_scopes(&resolver, &scopes);

    // Walk the dotted chain by name. A called name continues through the
    // matched scope's declared call type; an uncalled function scope hides
    // its members; a name that is also a typed variable continues through
    // the variable's possible types instead. Every step sees base-class
    // members through the expanded scope list.
    for reference in &context.references {
        let mut next = Vec::new();
        for scope in &scopes {
            let child = scope.child_scope(&reference.name);
            if reference.kind == ReferenceKind::ScopeCall {
                if let Some(call_type) = child.as_ref().and_then(ScopeRef::call_type) {
                    if let Some(pair) =
                        resolver.resolve_references(&call_type.references, scope, &scope.module())
                    {
                        next.push(pair.locals);
                    }
                }
                continue;
            }
            if let Some(child) = child {
                if child.kind() != ScopeKind::Function {
                    next.push(child);
                    continue;
                }
            }
            if let Some(variable) = scope.child_variable(&reference.name) {
                for type_id in &variable.possible_type_ids {
                    if let Some(found) = resolver.resolve_type_id(type_id, scope) {
                        next.push(found);
                    }
                }
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        scopes = with_base_scopes(&resolver, &next);
    }

    let needle = context.prefix.to_lowercase();
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for scope in &scopes {
        for child in scope.children() {
            if !matches_prefix(child.name(), &needle) || !seen.insert(child.name().to_string()) {
                continue;
            }
            items.push(CompletionItem {
                text: child.name().to_string(),
                icon: child.icon(),
                detail: Some(scope.dotted_name().to_string()),
            });
        }
        for variable in scope.variables() {
            if !matches_prefix(&variable.name, &needle) || !seen.insert(variable.name.clone()) {
                continue;
            }
            items.push(CompletionItem {
                text: variable.name.clone(),
                icon: IconKind::for_variable(&variable.name),
                detail: variable_detail(variable),
            });
        }
    }

    // Keywords only make sense for a bare name, not after a dot.
    if context.references.is_empty() {
        for keyword in PYTHON_KEYWORDS {
            if matches_prefix(keyword, &needle) && seen.insert((*keyword).to_string()) {
                items.push(CompletionItem {
                    text: (*keyword).to_string(),
                    icon: IconKind::Keyword,
                    detail: None,
                });
            }
        }
    }

    items.sort_by(|a, b| a.text.to_lowercase().cmp(&b.text.to_lowercase()));
    items
}

fn tooltip(model: &CodeModel, file_path: &str, source: &str, position: usize) -> Option<String> {
    let context = context_at(source, position)?;
    let (locals, globals) = scopes_at(model, file_path, source, position, context.line_indent)?;
    let resolver = TypeResolver::new(model);

    let mut chain = context.references.clone();
    if !context.prefix.is_empty() {
        chain.push(TypeReference::lookup(&context.prefix));
    }
    if chain.is_empty() {
        return None;
    }

    if let Some(pair) = resolver.resolve_references(&chain, &locals, &globals) {
        return Some(describe_scope(&pair.locals));
    }

    // The chain dead-ends when the last segment is a variable with no known
    // type; still describe the variable itself.
    if !context.prefix.is_empty() {
        let pair = resolver.resolve_references(&context.references, &locals, &globals)?;
        for scope in [&pair.locals, &pair.globals] {
            if let Some(variable) = scope.child_variable(&context.prefix) {
                return Some(describe_variable(scope, variable));
            }
        }
    }
    None
}

fn definition(
    model: &CodeModel,
    file_path: &str,
    source: &str,
    position: usize,
) -> Option<Location> {
    let context = context_at(source, position)?;
    let (locals, globals) = scopes_at(model, file_path, source, position, context.line_indent)?;
    let resolver = TypeResolver::new(model);

    // A variable declaration is a better target than the scope its type
    // resolves to, so look for one first.
    if !context.prefix.is_empty() {
        if let Some(pair) = resolver.resolve_references(&context.references, &locals, &globals) {
            for scope in [&pair.locals, &pair.globals] {
                if let Some(variable) = scope.child_variable(&context.prefix) {
                    if let Some(declaration) = &variable.declaration {
                        return Some(Location {
                            file_path: scope.file().file_path().to_string(),
                            line: declaration.line,
                        });
                    }
                }
            }
        }
    }

    let mut chain = context.references.clone();
    if !context.prefix.is_empty() {
        chain.push(TypeReference::lookup(&context.prefix));
    }
    if chain.is_empty() {
        return None;
    }
    let pair = resolver.resolve_references(&chain, &locals, &globals)?;
    let line = pair.locals.declaration().map_or(1, |declaration| declaration.line.max(1));
    Some(Location {
        file_path: pair.locals.file().file_path().to_string(),
        line,
    })
}

fn matches_prefix(name: &str, needle: &str) -> bool {
    needle.is_empty() || name.to_lowercase().starts_with(needle)
}

fn variable_detail(variable: &VariableDescriptor) -> Option<String> {
    if variable.possible_type_ids.is_empty() {
        None
    } else {
        Some(variable.possible_type_ids.join(", "))
    }
}

fn describe_scope(scope: &ScopeRef) -> String {
    match scope.kind() {
        ScopeKind::Module => format!("module {}", scope.dotted_name()),
        ScopeKind::Class => format!("class {}", scope.dotted_name()),
        ScopeKind::Function => {
            let arguments: Vec<&str> = scope
                .variables()
                .iter()
                .filter(|variable| variable.kind == VariableKind::FunctionArgument)
                .map(|variable| variable.name.as_str())
                .collect();
            format!("def {}({})", scope.dotted_name(), arguments.join(", "))
        }
    }
}

fn describe_variable(scope: &ScopeRef, variable: &VariableDescriptor) -> String {
    let dotted = format!("{}.{}", scope.dotted_name(), variable.name);
    match variable_detail(variable) {
        Some(types) => format!("variable {dotted}: {types}"),
        None => format!("variable {dotted}"),
    }
}

/// 1-based line number of a character position.
fn line_of(source: &str, position: usize) -> u32 {
    source
        .chars()
        .take(position)
        .filter(|c| *c == '\n')
        .count() as u32
        + 1
}

// ============================================================================
// Tests
// ============================================================================
