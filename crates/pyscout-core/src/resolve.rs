//! Static type resolution over the code model.
//!
//! [`TypeResolver`] folds a [`TypeDescriptor`] left to right. Each step runs
//! against a pair of scopes: `locals`, the scope the previous step resolved
//! to, and `globals`, the module scope in effect. A name is looked up through
//! `locals`, then the recursively resolved base classes of `locals`, then
//! `globals`; the first match wins. Call references continue through the
//! matched scope's declared call type, resolved in the current pair.
//!
//! Source-level types are approximate and freely recursive, so every step is
//! checked against a guard set keyed by reference and scope pair. A repeated
//! step answers "no type" instead of recursing further. Resolution never
//! fails loudly; any dead end is `None`.

use std::collections::HashSet;

use tracing::trace;

use crate::descriptor::{ReferenceKind, TypeDescriptor, TypeReference};
use crate::model::CodeModel;
use crate::scope::ScopeRef;

// ============================================================================
// Resolved Pairs
// ============================================================================

/// The result of a resolution step: the scope a name resolved to, plus the
/// module scope lookups continue in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePair {
    pub locals: ScopeRef,
    pub globals: ScopeRef,
}

impl ScopePair {
    fn from_scope(scope: ScopeRef) -> ScopePair {
        let globals = scope.module();
        ScopePair {
            locals: scope,
            globals,
        }
    }
}

// ============================================================================
// Recursion Guard
// ============================================================================

/// One resolution step: a reference plus the identity of the scope pair it
/// runs in. `None` stands for an absent locals scope.
type GuardKey = (TypeReference, Option<(usize, u32)>, (usize, u32));

#[derive(Debug, Default)]
struct RecursionGuard {
    seen: HashSet<GuardKey>,
}

impl RecursionGuard {
    /// Records a step; false means the identical step already ran in this
    /// resolution and must answer "no type".
    fn enter(
        &mut self,
        reference: &TypeReference,
        locals: Option<&ScopeRef>,
        globals: &ScopeRef,
    ) -> bool {
        self.seen.insert((
            reference.clone(),
            locals.map(ScopeRef::identity),
            globals.identity(),
        ))
    }
}

// ============================================================================
// TypeResolver
// ============================================================================

pub struct TypeResolver<'a> {
    model: &'a CodeModel,
}

impl<'a> TypeResolver<'a> {
    pub fn new(model: &'a CodeModel) -> Self {
        Self { model }
    }

    /// Resolves a full descriptor starting from the given scope pair.
    pub fn resolve(
        &self,
        descriptor: &TypeDescriptor,
        locals: &ScopeRef,
        globals: &ScopeRef,
    ) -> Option<ScopePair> {
        self.resolve_references(&descriptor.references, locals, globals)
    }

    /// Resolves a raw reference chain, as produced by cursor extraction.
    pub fn resolve_references(
        &self,
        references: &[TypeReference],
        locals: &ScopeRef,
        globals: &ScopeRef,
    ) -> Option<ScopePair> {
        let mut guard = RecursionGuard::default();
        self.fold(references, Some(locals), globals, &mut guard)
    }

    /// Resolves a dotted type identifier against the model index, retrying
    /// once relative to the referring scope's module.
    pub fn resolve_type_id(&self, type_id: &str, relative_to: &ScopeRef) -> Option<ScopeRef> {
        self.model.scope_by_dotted_name(type_id, Some(relative_to))
    }

    /// The scope followed by its recursively resolved base classes, in
    /// declaration order.
    pub fn scope_with_bases(&self, scope: &ScopeRef, globals: &ScopeRef) -> Vec<ScopeRef> {
        let mut scopes = vec![scope.clone()];
        let mut guard = RecursionGuard::default();
        self.push_base_scopes(scope, globals, &mut guard, &mut scopes);
        scopes
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn fold(
        &self,
        references: &[TypeReference],
        locals: Option<&ScopeRef>,
        globals: &ScopeRef,
        guard: &mut RecursionGuard,
    ) -> Option<ScopePair> {
        let mut current: Option<ScopePair> = None;
        for reference in references {
            let (step_locals, step_globals) = match &current {
                Some(pair) => (Some(&pair.locals), &pair.globals),
                None => (locals, globals),
            };
            let next = self.resolve_reference(reference, step_locals, step_globals, guard)?;
            current = Some(next);
        }
        match current {
            Some(pair) => Some(pair),
            // An empty chain resolves to the starting pair, if there is one.
            None => locals.map(|locals| ScopePair {
                locals: locals.clone(),
                globals: globals.clone(),
            }),
        }
    }

    fn resolve_reference(
        &self,
        reference: &TypeReference,
        locals: Option<&ScopeRef>,
        globals: &ScopeRef,
        guard: &mut RecursionGuard,
    ) -> Option<ScopePair> {
        if !guard.enter(reference, locals, globals) {
            trace!(name = %reference.name, "abandoning repeated resolution step");
            return None;
        }

        match reference.kind {
            ReferenceKind::Absolute => self
                .model
                .scope_by_dotted_name(&reference.name, None)
                .map(ScopePair::from_scope),
            ReferenceKind::ScopeLookup => {
                let scopes = self.lookup_scopes(locals, globals, guard);
                trace!(name = %reference.name, scopes = scopes.len(), "resolving lookup");
                for scope in &scopes {
                    if let Some(child) = scope.child_scope(&reference.name) {
                        return Some(ScopePair::from_scope(child));
                    }
                    if let Some(variable) = scope.child_variable(&reference.name) {
                        for type_id in &variable.possible_type_ids {
                            if let Some(target) = self.resolve_type_id(type_id, scope) {
                                return Some(ScopePair::from_scope(target));
                            }
                        }
                    }
                }
                None
            }
            ReferenceKind::ScopeCall => {
                let scopes = self.lookup_scopes(locals, globals, guard);
                trace!(name = %reference.name, scopes = scopes.len(), "resolving call");
                for scope in &scopes {
                    if let Some(child) = scope.child_scope(&reference.name) {
                        let call_type = child.call_type()?;
                        return self.fold(&call_type.references, locals, globals, guard);
                    }
                }
                None
            }
        }
    }

    /// The scope walk for one lookup: locals, the recursively resolved base
    /// classes of locals in declaration order, then globals.
    fn lookup_scopes(
        &self,
        locals: Option<&ScopeRef>,
        globals: &ScopeRef,
        guard: &mut RecursionGuard,
    ) -> Vec<ScopeRef> {
        let mut scopes = Vec::new();
        if let Some(locals) = locals {
            scopes.push(locals.clone());
            self.push_base_scopes(locals, globals, guard, &mut scopes);
        }
        scopes.push(globals.clone());
        scopes
    }

    fn push_base_scopes(
        &self,
        scope: &ScopeRef,
        globals: &ScopeRef,
        guard: &mut RecursionGuard,
        out: &mut Vec<ScopeRef>,
    ) {
        for base in scope.base_types() {
            if let Some(pair) = self.fold(&base.references, None, globals, guard) {
                out.push(pair.locals.clone());
                self.push_base_scopes(&pair.locals, &pair.globals, guard, out);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
