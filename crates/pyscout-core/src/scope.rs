//! In-memory scope trees built from parse descriptors.
//!
//! Each parsed file becomes a [`File`]: a flat arena of scope nodes addressed
//! by [`ScopeId`], with the module scope at the root. Files are immutable
//! once built and shared behind `Arc`, so a re-parse swaps the whole file
//! rather than mutating nodes in place. [`ScopeRef`] pairs an `Arc<File>`
//! with a node id and is the handle the rest of the crate works with.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::{
    FileDescriptor, Position, ScopeDescriptor, ScopeKind, TypeDescriptor, VariableDescriptor,
};
use crate::message::{ProposalKind, SymbolKind};

// ============================================================================
// Identifiers
// ============================================================================

/// Index of a scope node within its [`File`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw arena index, used for identity keys.
    pub fn raw(self) -> u32 {
        self.0
    }
}

// ============================================================================
// Arena Nodes
// ============================================================================

#[derive(Debug)]
struct ScopeNode {
    name: String,
    kind: ScopeKind,
    declaration: Option<Position>,
    base_types: Vec<TypeDescriptor>,
    call_type: Option<TypeDescriptor>,
    dotted_name: String,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    variables: Vec<VariableDescriptor>,
}

// ============================================================================
// Files
// ============================================================================

/// One parsed file: module metadata plus the scope arena.
#[derive(Debug)]
pub struct File {
    file_path: String,
    module_name: String,
    nodes: Vec<ScopeNode>,
    root: ScopeId,
}

impl File {
    /// Builds the arena from a worker descriptor, computing the fully dotted
    /// name of every scope from its parent chain.
    pub fn from_descriptor(descriptor: FileDescriptor) -> File {
        let FileDescriptor {
            file_path,
            module_name,
            scope,
        } = descriptor;

        let mut file = File {
            file_path,
            module_name: module_name.clone(),
            nodes: Vec::new(),
            root: ScopeId(0),
        };
        let root = file.insert(scope, None, module_name);
        file.root = root;
        file
    }

    fn insert(
        &mut self,
        descriptor: ScopeDescriptor,
        parent: Option<ScopeId>,
        dotted: String,
    ) -> ScopeId {
        let id = ScopeId(self.nodes.len() as u32);
        self.nodes.push(ScopeNode {
            name: descriptor.name,
            kind: descriptor.kind,
            declaration: descriptor.declaration,
            base_types: descriptor.base_types,
            call_type: descriptor.call_type,
            dotted_name: dotted.clone(),
            parent,
            children: Vec::new(),
            variables: descriptor.child_variables,
        });
        for child in descriptor.child_scopes {
            let child_dotted = format!("{dotted}.{}", child.name);
            let child_id = self.insert(child, Some(id), child_dotted);
            self.nodes[id.index()].children.push(child_id);
        }
        id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn scope_count(&self) -> usize {
        self.nodes.len()
    }

    /// All scope ids in the file, root first.
    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> {
        (0..self.nodes.len() as u32).map(ScopeId)
    }

    /// The module scope of this file.
    pub fn root_ref(self: &Arc<File>) -> ScopeRef {
        ScopeRef {
            file: Arc::clone(self),
            id: self.root,
        }
    }

    /// A handle to an arbitrary scope in this file.
    pub fn scope_ref(self: &Arc<File>, id: ScopeId) -> ScopeRef {
        ScopeRef {
            file: Arc::clone(self),
            id,
        }
    }

    fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.index()]
    }
}

// ============================================================================
// Scope Handles
// ============================================================================

/// A shared handle to one scope in one file.
#[derive(Clone)]
pub struct ScopeRef {
    file: Arc<File>,
    id: ScopeId,
}

impl ScopeRef {
    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.file.node(self.id).name
    }

    pub fn kind(&self) -> ScopeKind {
        self.file.node(self.id).kind
    }

    pub fn dotted_name(&self) -> &str {
        &self.file.node(self.id).dotted_name
    }

    pub fn declaration(&self) -> Option<Position> {
        self.file.node(self.id).declaration
    }

    pub fn base_types(&self) -> &[TypeDescriptor] {
        &self.file.node(self.id).base_types
    }

    pub fn call_type(&self) -> Option<&TypeDescriptor> {
        self.file.node(self.id).call_type.as_ref()
    }

    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.file.node(self.id).variables
    }

    pub fn parent(&self) -> Option<ScopeRef> {
        self.file.node(self.id).parent.map(|id| ScopeRef {
            file: Arc::clone(&self.file),
            id,
        })
    }

    /// The module scope at the root of this scope's file.
    pub fn module(&self) -> ScopeRef {
        ScopeRef {
            file: Arc::clone(&self.file),
            id: self.file.root,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = ScopeRef> + '_ {
        self.file.node(self.id).children.iter().map(|id| ScopeRef {
            file: Arc::clone(&self.file),
            id: *id,
        })
    }

    /// Direct child scope with the given name.
    pub fn child_scope(&self, name: &str) -> Option<ScopeRef> {
        self.children().find(|child| child.name() == name)
    }

    /// Direct child variable with the given name.
    pub fn child_variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.file
            .node(self.id)
            .variables
            .iter()
            .find(|variable| variable.name == name)
    }

    /// Guesses the innermost scope containing a cursor from its line and the
    /// indentation of its logical line.
    ///
    /// Descends into the latest child scope declared before `line` at a
    /// shallower indentation than `indent`, recursively. With no matching
    /// child the current scope is the answer.
    pub fn find_local_scope(&self, line: u32, indent: u32) -> ScopeRef {
        let mut best: Option<(Position, ScopeRef)> = None;
        for child in self.children() {
            let Some(declaration) = child.declaration() else {
                continue;
            };
            if declaration.line >= line || declaration.column >= indent {
                continue;
            }
            let replace = match &best {
                Some((best_pos, _)) => declaration.line > best_pos.line,
                None => true,
            };
            if replace {
                best = Some((declaration, child));
            }
        }
        match best {
            Some((_, child)) => child.find_local_scope(line, indent),
            None => self.clone(),
        }
    }

    pub fn icon(&self) -> IconKind {
        IconKind::for_scope_kind(self.kind(), self.name())
    }

    /// True when both handles point at the same node of the same file.
    pub fn same_scope(&self, other: &ScopeRef) -> bool {
        Arc::ptr_eq(&self.file, &other.file) && self.id == other.id
    }

    /// Stable identity key for guard sets and deduplication.
    pub fn identity(&self) -> (usize, u32) {
        (Arc::as_ptr(&self.file) as usize, self.id.raw())
    }
}

impl fmt::Debug for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRef")
            .field("file", &self.file.file_path)
            .field("dotted_name", &self.dotted_name())
            .field("kind", &self.kind())
            .finish()
    }
}

impl PartialEq for ScopeRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_scope(other)
    }
}

impl Eq for ScopeRef {}

// ============================================================================
// Icons
// ============================================================================

/// Icon classification shown next to completion proposals, locator entries,
/// and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconKind {
    Class,
    Function,
    FunctionPrivate,
    Variable,
    VariablePrivate,
    Namespace,
    Keyword,
}

impl IconKind {
    /// A leading underscore marks functions and variables as private.
    pub fn for_scope_kind(kind: ScopeKind, name: &str) -> IconKind {
        match kind {
            ScopeKind::Module => IconKind::Namespace,
            ScopeKind::Class => IconKind::Class,
            ScopeKind::Function => {
                if name.starts_with('_') {
                    IconKind::FunctionPrivate
                } else {
                    IconKind::Function
                }
            }
        }
    }

    pub fn for_variable(name: &str) -> IconKind {
        if name.starts_with('_') {
            IconKind::VariablePrivate
        } else {
            IconKind::Variable
        }
    }

    pub fn for_proposal(kind: ProposalKind, name: &str) -> IconKind {
        match kind {
            ProposalKind::Keyword => IconKind::Keyword,
            ProposalKind::Instance => IconKind::for_variable(name),
            ProposalKind::Class => IconKind::Class,
            ProposalKind::Function => IconKind::for_scope_kind(ScopeKind::Function, name),
            ProposalKind::Module => IconKind::Namespace,
        }
    }

    pub fn for_symbol(kind: SymbolKind, name: &str) -> IconKind {
        match kind {
            SymbolKind::Module => IconKind::Namespace,
            SymbolKind::Class => IconKind::Class,
            SymbolKind::Function => IconKind::for_scope_kind(ScopeKind::Function, name),
            SymbolKind::Variable => IconKind::for_variable(name),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::VariableKind;

    /// module m:
    ///   class Foo (line 3):
    ///     def bar(self) (line 4, col 4)
    ///   def baz(a) (line 10)
    ///   x = ... (line 1)
    fn make_file() -> Arc<File> {
        let mut bar = ScopeDescriptor::new("bar", ScopeKind::Function);
        bar.declaration = Some(Position::new(4, 4));
        let mut self_var = VariableDescriptor::new("self", VariableKind::FunctionArgument);
        self_var.possible_type_ids = vec!["Foo".to_string()];
        bar.child_variables = vec![self_var];

        let mut foo = ScopeDescriptor::new("Foo", ScopeKind::Class);
        foo.declaration = Some(Position::new(3, 0));
        foo.call_type = Some(TypeDescriptor::single(crate::descriptor::TypeReference::lookup("Foo")));
        foo.child_scopes = vec![bar];

        let mut baz = ScopeDescriptor::new("baz", ScopeKind::Function);
        baz.declaration = Some(Position::new(10, 0));
        baz.child_variables = vec![VariableDescriptor::new("a", VariableKind::FunctionArgument)];

        let mut module = ScopeDescriptor::new("m", ScopeKind::Module);
        module.declaration = Some(Position::new(0, 0));
        module.child_scopes = vec![foo, baz];
        module.child_variables = vec![{
            let mut x = VariableDescriptor::new("x", VariableKind::ScopeVariable);
            x.declaration = Some(Position::new(1, 0));
            x
        }];

        Arc::new(File::from_descriptor(FileDescriptor {
            file_path: "/src/m.py".to_string(),
            module_name: "m".to_string(),
            scope: module,
        }))
    }

    mod arena_tests {
        use super::*;

        #[test]
        fn dotted_names_follow_the_parent_chain() {
            let file = make_file();
            let root = file.root_ref();
            assert_eq!(root.dotted_name(), "m");

            let foo = root.child_scope("Foo").unwrap();
            assert_eq!(foo.dotted_name(), "m.Foo");

            let bar = foo.child_scope("bar").unwrap();
            assert_eq!(bar.dotted_name(), "m.Foo.bar");
            assert_eq!(bar.module().dotted_name(), "m");
            assert_eq!(bar.parent().unwrap().dotted_name(), "m.Foo");
        }

        #[test]
        fn scope_ids_cover_every_node() {
            let file = make_file();
            assert_eq!(file.scope_count(), 4);
            assert_eq!(file.scope_ids().count(), 4);
        }

        #[test]
        fn child_lookups_find_scopes_and_variables() {
            let file = make_file();
            let root = file.root_ref();
            assert!(root.child_scope("Foo").is_some());
            assert!(root.child_scope("missing").is_none());
            assert_eq!(root.child_variable("x").unwrap().name, "x");
            assert!(root.child_variable("Foo").is_none());
        }

        #[test]
        fn same_scope_distinguishes_nodes_and_files() {
            let file = make_file();
            let other = make_file();
            let root = file.root_ref();
            assert!(root.same_scope(&file.root_ref()));
            assert!(!root.same_scope(&other.root_ref()));
            assert!(!root.same_scope(&root.child_scope("Foo").unwrap()));
        }
    }

    mod local_scope_tests {
        use super::*;

        #[test]
        fn module_level_cursor_stays_at_the_root() {
            let file = make_file();
            let local = file.root_ref().find_local_scope(2, 0);
            assert_eq!(local.dotted_name(), "m");
        }

        #[test]
        fn indented_cursor_descends_into_the_class_body() {
            let file = make_file();
            let local = file.root_ref().find_local_scope(5, 4);
            assert_eq!(local.dotted_name(), "m.Foo");
        }

        #[test]
        fn deeper_indentation_reaches_the_method() {
            let file = make_file();
            let local = file.root_ref().find_local_scope(6, 8);
            assert_eq!(local.dotted_name(), "m.Foo.bar");
        }

        #[test]
        fn later_sibling_wins_after_its_declaration_line() {
            let file = make_file();
            let local = file.root_ref().find_local_scope(12, 4);
            assert_eq!(local.dotted_name(), "m.baz");
        }
    }

    mod icon_tests {
        use super::*;

        #[test]
        fn scope_icons_follow_kind_and_visibility() {
            assert_eq!(
                IconKind::for_scope_kind(ScopeKind::Module, "m"),
                IconKind::Namespace
            );
            assert_eq!(
                IconKind::for_scope_kind(ScopeKind::Class, "_Hidden"),
                IconKind::Class
            );
            assert_eq!(
                IconKind::for_scope_kind(ScopeKind::Function, "run"),
                IconKind::Function
            );
            assert_eq!(
                IconKind::for_scope_kind(ScopeKind::Function, "_run"),
                IconKind::FunctionPrivate
            );
        }

        #[test]
        fn variable_icons_use_the_underscore_convention() {
            assert_eq!(IconKind::for_variable("x"), IconKind::Variable);
            assert_eq!(IconKind::for_variable("_x"), IconKind::VariablePrivate);
        }

        #[test]
        fn proposal_icons_cover_keywords() {
            assert_eq!(
                IconKind::for_proposal(ProposalKind::Keyword, "import"),
                IconKind::Keyword
            );
            assert_eq!(
                IconKind::for_proposal(ProposalKind::Instance, "_x"),
                IconKind::VariablePrivate
            );
            assert_eq!(
                IconKind::for_symbol(SymbolKind::Function, "_f"),
                IconKind::FunctionPrivate
            );
        }
    }
}
