//! The embedded Python worker program.
//!
//! The script is compiled into the binary and written to a scratch
//! directory at pool startup, so the installed artifact stays a single
//! executable. It only uses the Python standard library and runs on any
//! interpreter that passes the version probe.

/// Source of the worker process, served verbatim by `pyscout script`.
pub const WORKER_SCRIPT: &str = include_str!("pyworker.py");

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod script_tests {
        use super::*;

        #[test]
        fn script_is_embedded() {
            assert!(WORKER_SCRIPT.len() > 1024);
        }

        #[test]
        fn script_has_an_entry_point() {
            assert!(WORKER_SCRIPT.contains("def main("));
            assert!(WORKER_SCRIPT.contains("__main__"));
        }

        #[test]
        fn script_stays_std_library_only() {
            for line in WORKER_SCRIPT.lines() {
                let line = line.trim();
                if let Some(module) = line.strip_prefix("import ") {
                    assert!(
                        matches!(
                            module,
                            "ast" | "json" | "keyword" | "os" | "re" | "socket" | "struct" | "sys"
                        ),
                        "unexpected import: {module}"
                    );
                }
            }
        }
    }
}
