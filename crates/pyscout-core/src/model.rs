//! The multi-file code model.
//!
//! [`CodeModel`] owns every parsed [`File`] and a dotted-name index over all
//! of their scopes. Ingesting a file fully replaces any previous parse of the
//! same path, and removal un-indexes exactly what ingestion indexed, so the
//! index never holds scopes from files the model no longer knows.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{FileDescriptor, ScopeKind};
use crate::scope::{File, ScopeRef};

// ============================================================================
// CodeModel
// ============================================================================

#[derive(Debug, Default)]
pub struct CodeModel {
    files_by_path: HashMap<String, Arc<File>>,
    paths_by_module: HashMap<String, String>,
    /// Every scope in every file, keyed by fully dotted name. Multiple files
    /// may define the same dotted name; the earliest surviving ingest wins
    /// lookups.
    scopes_by_dotted_name: HashMap<String, Vec<ScopeRef>>,
}

impl CodeModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Installs a parsed file, replacing any earlier parse of the same path.
    pub fn ingest(&mut self, descriptor: FileDescriptor) -> Arc<File> {
        self.remove(&descriptor.file_path);

        let file = Arc::new(File::from_descriptor(descriptor));
        for id in file.scope_ids() {
            let scope = file.scope_ref(id);
            self.scopes_by_dotted_name
                .entry(scope.dotted_name().to_string())
                .or_default()
                .push(scope);
        }
        self.paths_by_module
            .insert(file.module_name().to_string(), file.file_path().to_string());
        debug!(
            file = file.file_path(),
            module = file.module_name(),
            scopes = file.scope_count(),
            "ingested file"
        );
        self.files_by_path
            .insert(file.file_path().to_string(), Arc::clone(&file));
        file
    }

    /// Drops a file and everything it contributed to the index.
    pub fn remove(&mut self, file_path: &str) -> Option<Arc<File>> {
        let file = self.files_by_path.remove(file_path)?;
        for id in file.scope_ids() {
            let dotted = file.scope_ref(id).dotted_name().to_string();
            if let Some(entries) = self.scopes_by_dotted_name.get_mut(&dotted) {
                entries.retain(|scope| !Arc::ptr_eq(scope.file(), &file));
                if entries.is_empty() {
                    self.scopes_by_dotted_name.remove(&dotted);
                }
            }
        }
        if self
            .paths_by_module
            .get(file.module_name())
            .is_some_and(|path| path == file_path)
        {
            self.paths_by_module.remove(file.module_name());
        }
        debug!(file = file_path, "removed file");
        Some(file)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn file_by_path(&self, file_path: &str) -> Option<&Arc<File>> {
        self.files_by_path.get(file_path)
    }

    pub fn file_by_module_name(&self, module_name: &str) -> Option<&Arc<File>> {
        self.paths_by_module
            .get(module_name)
            .and_then(|path| self.files_by_path.get(path))
    }

    pub fn all_files(&self) -> impl Iterator<Item = &Arc<File>> {
        self.files_by_path.values()
    }

    pub fn file_count(&self) -> usize {
        self.files_by_path.len()
    }

    /// Finds a scope by fully dotted name.
    ///
    /// When the exact name misses and `relative_to` is given, the lookup is
    /// retried once with the referring scope's module name prefixed. Names
    /// written inside a module usually omit that module's own prefix, and
    /// this retry is the only fallback applied.
    pub fn scope_by_dotted_name(
        &self,
        name: &str,
        relative_to: Option<&ScopeRef>,
    ) -> Option<ScopeRef> {
        if let Some(hit) = self
            .scopes_by_dotted_name
            .get(name)
            .and_then(|entries| entries.first())
        {
            return Some(hit.clone());
        }
        let module = relative_to?.module();
        let retried = format!("{}.{name}", module.dotted_name());
        self.scopes_by_dotted_name
            .get(&retried)
            .and_then(|entries| entries.first())
            .cloned()
    }

    // ------------------------------------------------------------------
    // Locator Walks
    // ------------------------------------------------------------------

    /// Case-insensitive substring search over scope names, used by locator
    /// style navigation.
    ///
    /// `file_path` restricts the walk to one file; `kinds` restricts the
    /// scope kinds reported. Results are sorted by dotted name for stable
    /// presentation.
    pub fn filter_scopes(
        &self,
        query: &str,
        file_path: Option<&str>,
        kinds: &[ScopeKind],
    ) -> Vec<ScopeRef> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        let mut walk = |file: &Arc<File>| {
            for id in file.scope_ids() {
                let scope = file.scope_ref(id);
                if !kinds.contains(&scope.kind()) {
                    continue;
                }
                if !needle.is_empty() && !scope.name().to_lowercase().contains(&needle) {
                    continue;
                }
                hits.push(scope);
            }
        };
        match file_path {
            Some(path) => {
                if let Some(file) = self.files_by_path.get(path) {
                    walk(file);
                }
            }
            None => {
                for file in self.files_by_path.values() {
                    walk(file);
                }
            }
        }
        hits.sort_by(|a, b| {
            (a.dotted_name(), a.file().file_path()).cmp(&(b.dotted_name(), b.file().file_path()))
        });
        hits
    }
}

// ============================================================================
// Tests
// ============================================================================
