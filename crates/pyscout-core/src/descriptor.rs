//! Serialized descriptors for parsed Python modules.
//!
//! A parser worker answers `parse_file` with a [`FileDescriptor`]: the module
//! scope with its nested scopes, variables, and unresolved type references.
//! Descriptors are deliberately dumb data. Nothing here is resolved; names in
//! [`TypeReference`] and `possible_type_ids` stay exactly as they appear in
//! source, and all linking happens later in [`crate::model`] and
//! [`crate::resolve`].
//!
//! Empty collections and absent options are omitted on the wire to keep parse
//! responses compact.

use serde::{Deserialize, Serialize};

// ============================================================================
// Source Positions
// ============================================================================

/// A location in a source file.
///
/// `line` is 1-based as reported by the Python `ast` module; the synthetic
/// module scope uses line 0. `column` is a 0-based offset and doubles as the
/// indentation depth of the declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Module,
    Class,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Bound by assignment in a scope body.
    ScopeVariable,
    /// A formal parameter of a function scope.
    FunctionArgument,
}

/// How one step of a dotted type expression should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A fully dotted name resolved directly against the model index.
    Absolute,
    /// A plain name looked up through the enclosing scope chain.
    ScopeLookup,
    /// Like `ScopeLookup`, but the result is called and its call type taken.
    ScopeCall,
}

// ============================================================================
// Type Expressions
// ============================================================================

/// One step of an unresolved type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeReference {
    pub kind: ReferenceKind,
    pub name: String,
}

impl TypeReference {
    pub fn absolute(name: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Absolute,
            name: name.into(),
        }
    }

    pub fn lookup(name: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::ScopeLookup,
            name: name.into(),
        }
    }

    pub fn call(name: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::ScopeCall,
            name: name.into(),
        }
    }
}

/// An unresolved type expression: references folded left to right, so
/// `Foo().bar` is `[call Foo, lookup bar]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<TypeReference>,
}

impl TypeDescriptor {
    pub fn new(references: Vec<TypeReference>) -> Self {
        Self { references }
    }

    pub fn single(reference: TypeReference) -> Self {
        Self {
            references: vec![reference],
        }
    }
}

// ============================================================================
// Scopes and Variables
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub kind: VariableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<Position>,
    /// Dotted names this variable may be an instance of, in declaration
    /// order. Resolution takes the first one that maps to a known scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_type_ids: Vec<String>,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            declaration: None,
            possible_type_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDescriptor {
    pub name: String,
    pub kind: ScopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<Position>,
    /// Base classes, for class scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_types: Vec<TypeDescriptor>,
    /// What calling this scope evaluates to: the class itself for classes,
    /// the declared or inferred return type for functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<TypeDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_scopes: Vec<ScopeDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_variables: Vec<VariableDescriptor>,
}

impl ScopeDescriptor {
    pub fn new(name: impl Into<String>, kind: ScopeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            declaration: None,
            base_types: Vec::new(),
            call_type: None,
            child_scopes: Vec::new(),
            child_variables: Vec::new(),
        }
    }
}

// ============================================================================
// Files
// ============================================================================

/// A fully parsed module as returned by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub file_path: String,
    /// Dotted module name derived from the package layout on disk.
    pub module_name: String,
    /// The module scope; its `name` equals `module_name`.
    pub scope: ScopeDescriptor,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod serde_tests {
        use super::*;

        #[test]
        fn empty_collections_are_omitted() {
            let scope = ScopeDescriptor::new("m", ScopeKind::Module);
            let json = serde_json::to_string(&scope).unwrap();
            assert_eq!(json, r#"{"name":"m","kind":"module"}"#);
        }

        #[test]
        fn missing_collections_deserialize_empty() {
            let scope: ScopeDescriptor =
                serde_json::from_str(r#"{"name":"m","kind":"module"}"#).unwrap();
            assert!(scope.base_types.is_empty());
            assert!(scope.call_type.is_none());
            assert!(scope.child_scopes.is_empty());
            assert!(scope.child_variables.is_empty());
        }

        #[test]
        fn reference_kinds_use_snake_case_tags() {
            let json = serde_json::to_string(&TypeReference::call("Foo")).unwrap();
            assert_eq!(json, r#"{"kind":"scope_call","name":"Foo"}"#);
            let back: TypeReference = serde_json::from_str(&json).unwrap();
            assert_eq!(back, TypeReference::call("Foo"));
        }

        #[test]
        fn nested_descriptor_round_trips() {
            let mut class = ScopeDescriptor::new("Foo", ScopeKind::Class);
            class.declaration = Some(Position::new(3, 0));
            class.call_type = Some(TypeDescriptor::single(TypeReference::lookup("Foo")));
            class.base_types = vec![TypeDescriptor::single(TypeReference::lookup("object"))];

            let mut var = VariableDescriptor::new("self", VariableKind::FunctionArgument);
            var.possible_type_ids = vec!["Foo".to_string()];
            let mut method = ScopeDescriptor::new("bar", ScopeKind::Function);
            method.declaration = Some(Position::new(4, 4));
            method.child_variables = vec![var];
            class.child_scopes = vec![method];

            let mut module = ScopeDescriptor::new("m", ScopeKind::Module);
            module.declaration = Some(Position::new(0, 0));
            module.child_scopes = vec![class];

            let file = FileDescriptor {
                file_path: "/src/m.py".to_string(),
                module_name: "m".to_string(),
                scope: module,
            };

            let json = serde_json::to_string(&file).unwrap();
            let back: FileDescriptor = serde_json::from_str(&json).unwrap();
            assert_eq!(back, file);
        }
    }
}
