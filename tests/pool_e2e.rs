//! End-to-end tests over real Python workers.
//!
//! Every test spawns the embedded worker script in a real interpreter and
//! drives it through the public pool and session APIs against a small
//! two-module project written to a temp directory.
//!
//! Tests skip gracefully when no `python3` is on `PATH`.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use pyscout::config::PyscoutConfig;
use pyscout::descriptor::ScopeKind;
use pyscout::error::PyscoutError;
use pyscout::message::{ProposalKind, ResponsePayload, SourceContext, SymbolKind};
use pyscout::pool::WorkerPool;
use pyscout::session::Session;

// ============================================================================
// Test Helpers
// ============================================================================

fn python_available() -> bool {
    if which::which("python3").is_ok() {
        return true;
    }
    eprintln!("skipping: python3 not found");
    false
}

fn config(worker_count: usize) -> PyscoutConfig {
    PyscoutConfig {
        worker_count,
        ..PyscoutConfig::default()
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn context(file_path: &str, source: &str) -> SourceContext {
    SourceContext {
        file_path: file_path.to_string(),
        source_text: source.to_string(),
        cursor_position: source.len() as u32,
    }
}

/// Writes the two-module demo project.
///
/// `app.py` defines `Widget` (line 4), `open_connection` (line 15) and a
/// module variable `conn` typed through the import (line 19); `db.py`
/// defines `Connection` (line 1) with `open` (line 4) and `close` (line 7).
fn demo_project() -> (TempDir, String, String) {
    let project = TempDir::new().unwrap();
    let app_py = project.path().join("app.py");
    let db_py = project.path().join("db.py");

    fs::write(
        &app_py,
        r#"from db import Connection


class Widget:
    """A drawable widget."""

    def __init__(self, color):
        self.color = color

    def paint(self):
        """Draw the widget."""
        return self.color


def open_connection():
    return Connection()


conn = Connection()
"#,
    )
    .unwrap();

    fs::write(
        &db_py,
        r#"class Connection:
    """A database connection."""

    def open(self, host):
        return self

    def close(self):
        pass
"#,
    )
    .unwrap();

    let app = path_string(&app_py);
    let db = path_string(&db_py);
    (project, app, db)
}

// ============================================================================
// Parsing
// ============================================================================

#[tokio::test]
async fn parse_file_reports_the_scope_tree() {
    if !python_available() {
        return;
    }
    let (_project, app_py, _db_py) = demo_project();
    let pool = WorkerPool::start(&config(1)).await.unwrap();

    let response = pool
        .parse_file(&app_py, None)
        .expect_success()
        .await
        .unwrap();
    let ResponsePayload::ParseFileResponse { file } = response.payload else {
        panic!("expected a parse_file_response");
    };

    assert_eq!(file.file_path, app_py);
    assert_eq!(file.module_name, "app");
    assert_eq!(file.scope.kind, ScopeKind::Module);

    let widget = file
        .scope
        .child_scopes
        .iter()
        .find(|scope| scope.name == "Widget")
        .unwrap();
    assert_eq!(widget.kind, ScopeKind::Class);
    assert_eq!(widget.declaration.as_ref().unwrap().line, 4);
    let paint = widget
        .child_scopes
        .iter()
        .find(|scope| scope.name == "paint")
        .unwrap();
    assert_eq!(paint.kind, ScopeKind::Function);
    assert_eq!(paint.declaration.as_ref().unwrap().line, 10);

    // The assignment is typed through the import table.
    let conn = file
        .scope
        .child_variables
        .iter()
        .find(|variable| variable.name == "conn")
        .unwrap();
    assert_eq!(conn.possible_type_ids, vec!["db.Connection".to_string()]);
    assert_eq!(conn.declaration.as_ref().unwrap().line, 19);

    let factory = file
        .scope
        .child_scopes
        .iter()
        .find(|scope| scope.name == "open_connection")
        .unwrap();
    assert!(factory.call_type.is_some());

    pool.shutdown().await.unwrap();
}

// ============================================================================
// Cursor Requests
// ============================================================================

#[tokio::test]
async fn completion_resolves_members_across_modules() {
    if !python_available() {
        return;
    }
    let (project, app_py, _db_py) = demo_project();
    let root = path_string(project.path());
    let pool = WorkerPool::start(&config(1)).await.unwrap();

    pool.create_project(&root).expect_success().await.unwrap();
    pool.rebuild_symbol_index(&root)
        .expect_success()
        .await
        .unwrap();

    // The buffer ends in a broken line, the normal shape mid-typing.
    let source = format!("{}conn.", fs::read_to_string(&app_py).unwrap());
    let response = pool
        .completion(context(&app_py, &source))
        .expect_success()
        .await
        .unwrap();
    let ResponsePayload::CompletionResponse { proposals, calltip } = response.payload else {
        panic!("expected a completion_response");
    };

    assert_eq!(calltip, None);
    let names: Vec<&str> = proposals.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["close", "open"]);
    assert!(proposals.iter().all(|p| p.kind == ProposalKind::Function));
    assert_eq!(proposals[0].scope.as_deref(), Some("db.Connection"));

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn calltip_replaces_proposals_inside_an_argument_list() {
    if !python_available() {
        return;
    }
    let (project, app_py, _db_py) = demo_project();
    let root = path_string(project.path());
    let pool = WorkerPool::start(&config(1)).await.unwrap();

    pool.create_project(&root).expect_success().await.unwrap();
    pool.rebuild_symbol_index(&root)
        .expect_success()
        .await
        .unwrap();

    let source = format!("{}conn.open(", fs::read_to_string(&app_py).unwrap());
    let response = pool
        .completion(context(&app_py, &source))
        .expect_success()
        .await
        .unwrap();
    let ResponsePayload::CompletionResponse { proposals, calltip } = response.payload else {
        panic!("expected a completion_response");
    };

    assert!(proposals.is_empty());
    assert_eq!(calltip.as_deref(), Some("open(self, host)"));

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn tooltip_describes_the_resolved_type() {
    if !python_available() {
        return;
    }
    let (project, app_py, _db_py) = demo_project();
    let root = path_string(project.path());
    let pool = WorkerPool::start(&config(1)).await.unwrap();

    pool.create_project(&root).expect_success().await.unwrap();
    pool.rebuild_symbol_index(&root)
        .expect_success()
        .await
        .unwrap();

    let source = format!("{}conn", fs::read_to_string(&app_py).unwrap());
    let response = pool
        .tooltip(context(&app_py, &source))
        .expect_success()
        .await
        .unwrap();
    let ResponsePayload::TooltipResponse { text } = response.payload else {
        panic!("expected a tooltip_response");
    };

    assert_eq!(text, "class db.Connection\n\nA database connection.");

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn definition_prefers_the_variable_declaration() {
    if !python_available() {
        return;
    }
    let (project, app_py, db_py) = demo_project();
    let root = path_string(project.path());
    let pool = WorkerPool::start(&config(1)).await.unwrap();

    pool.create_project(&root).expect_success().await.unwrap();
    pool.rebuild_symbol_index(&root)
        .expect_success()
        .await
        .unwrap();

    let app_source = fs::read_to_string(&app_py).unwrap();

    // The bare variable goes to its own assignment, not to the class.
    let source = format!("{app_source}conn");
    let response = pool
        .definition_location(context(&app_py, &source))
        .expect_success()
        .await
        .unwrap();
    let ResponsePayload::DefinitionLocationResponse { location } = response.payload else {
        panic!("expected a definition_location_response");
    };
    let location = location.unwrap();
    assert_eq!(location.file_path, app_py);
    assert_eq!(location.line, 19);

    // A member lands in the file that declares it.
    let source = format!("{app_source}conn.open");
    let response = pool
        .definition_location(context(&app_py, &source))
        .expect_success()
        .await
        .unwrap();
    let ResponsePayload::DefinitionLocationResponse { location } = response.payload else {
        panic!("expected a definition_location_response");
    };
    let location = location.unwrap();
    assert_eq!(location.file_path, db_py);
    assert_eq!(location.line, 4);

    pool.shutdown().await.unwrap();
}

// ============================================================================
// Symbol Search
// ============================================================================

#[tokio::test]
async fn search_spans_the_project_index() {
    if !python_available() {
        return;
    }
    let (project, _app_py, db_py) = demo_project();
    let root = path_string(project.path());
    let pool = WorkerPool::start(&config(2)).await.unwrap();
    let mut session = Session::new(pool);

    session.open_project(&root).await.unwrap();

    let results = session.search("open", None, None).await.unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.symbol_name.as_str()).collect();
    assert_eq!(names, vec!["app.open_connection", "db.Connection.open"]);
    assert_eq!(results[0].kind, SymbolKind::Function);
    assert_eq!(results[0].line, 15);
    assert_eq!(results[1].file_path, db_py);
    assert_eq!(results[1].line, 4);

    let classes = session
        .search("connection", None, Some(SymbolKind::Class))
        .await
        .unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].symbol_name, "db.Connection");
    assert_eq!(classes[0].line, 1);

    // Closing the project empties the index.
    session.close_project(&root);
    let after = session.search("open", None, None).await.unwrap();
    assert!(after.is_empty());

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn refresh_reindexes_a_changed_file() {
    if !python_available() {
        return;
    }
    let (project, _app_py, db_py) = demo_project();
    let root = path_string(project.path());
    let pool = WorkerPool::start(&config(1)).await.unwrap();
    let mut session = Session::new(pool);

    session.open_project(&root).await.unwrap();
    assert!(session.search("ping", None, None).await.unwrap().is_empty());

    let mut db_source = fs::read_to_string(&db_py).unwrap();
    db_source.push_str("\n    def ping(self):\n        return True\n");
    fs::write(&db_py, &db_source).unwrap();

    let file = session.refresh_file(&db_py).await.unwrap();
    let connection = file.root_ref().child_scope("Connection").unwrap();
    assert!(connection.child_scope("ping").is_some());

    let results = session.search("ping", None, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].symbol_name, "db.Connection.ping");
    assert_eq!(results[0].line, 10);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn files_outside_projects_are_rejected() {
    if !python_available() {
        return;
    }
    let pool = WorkerPool::start(&config(1)).await.unwrap();

    let error = pool
        .update_symbol_index("/nowhere/stray.py")
        .expect_success()
        .await
        .unwrap_err();
    match error {
        PyscoutError::Worker { message } => {
            assert!(message.contains("not inside an open project"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }

    pool.shutdown().await.unwrap();
}

// ============================================================================
// Local Model
// ============================================================================

#[tokio::test]
async fn local_queries_answer_from_the_ingested_model() {
    if !python_available() {
        return;
    }
    let (_project, app_py, db_py) = demo_project();
    let pool = WorkerPool::start(&config(2)).await.unwrap();
    let mut session = Session::new(pool);

    session.analyze_file(&app_py, None).await.unwrap();
    session.analyze_file(&db_py, None).await.unwrap();
    let app_source = fs::read_to_string(&app_py).unwrap();

    let buffer = format!("{app_source}conn.");
    let items = session.completions_at(&app_py, &buffer, buffer.len());
    let texts: Vec<&str> = items.iter().map(|item| item.text.as_str()).collect();
    assert_eq!(texts, vec!["close", "open"]);

    let buffer = format!("{app_source}conn");
    assert_eq!(
        session.tooltip_at(&app_py, &buffer, buffer.len()).as_deref(),
        Some("class db.Connection")
    );

    let buffer = format!("{app_source}conn.open");
    let location = session.definition_at(&app_py, &buffer, buffer.len()).unwrap();
    assert_eq!(location.file_path, db_py);
    assert_eq!(location.line, 4);

    session.shutdown().await.unwrap();
}
