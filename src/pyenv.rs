//! Python interpreter discovery.
//!
//! Workers are plain Python processes, so the pool needs a working
//! interpreter of at least version 3.8. Resolution tries, in order:
//!
//! 1. An explicit override (CLI flag or config file)
//! 2. `PYSCOUT_PYTHON`
//! 3. The active virtualenv (`VIRTUAL_ENV`)
//! 4. The active conda environment (`CONDA_PREFIX`)
//! 5. `python3` / `python` on `PATH`
//!
//! Explicit sources (1 and 2) fail hard when unusable; ambient sources are
//! skipped quietly so a broken virtualenv does not take the tool down.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{PyscoutError, PyscoutResult};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable naming the interpreter directly.
pub const PYTHON_ENV_VAR: &str = "PYSCOUT_PYTHON";

/// Minimum supported interpreter version.
pub const MIN_PYTHON: (u32, u32) = (3, 8);

/// Names probed on `PATH`, in preference order.
const PYTHON_NAMES: &[&str] = &["python3", "python"];

// ============================================================================
// Versions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    /// Parses `--version` output such as `Python 3.11.2` or `3.12.0rc1`.
    pub fn parse(text: &str) -> Option<PythonVersion> {
        let text = text.trim();
        let text = text.strip_prefix("Python ").unwrap_or(text);
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        // Patch may be absent or carry a pre-release suffix like "0rc1".
        let patch = parts
            .next()
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .unwrap_or(0);
        Some(PythonVersion {
            major,
            minor,
            patch,
        })
    }

    pub fn meets_minimum(&self) -> bool {
        (self.major, self.minor) >= MIN_PYTHON
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Finds a usable interpreter, honoring an explicit override first.
pub fn discover(override_path: Option<&Path>) -> PyscoutResult<PathBuf> {
    let mut tried: Vec<String> = Vec::new();

    if let Some(path) = override_path {
        return verify(path).ok_or_else(|| {
            PyscoutError::python_not_found(format!(
                "configured interpreter {} is missing or below {}.{}",
                path.display(),
                MIN_PYTHON.0,
                MIN_PYTHON.1
            ))
        });
    }

    if let Ok(value) = std::env::var(PYTHON_ENV_VAR) {
        let path = PathBuf::from(&value);
        return verify(&path).ok_or_else(|| {
            PyscoutError::python_not_found(format!(
                "{PYTHON_ENV_VAR}={value} is missing or below {}.{}",
                MIN_PYTHON.0, MIN_PYTHON.1
            ))
        });
    }

    for env_var in ["VIRTUAL_ENV", "CONDA_PREFIX"] {
        if let Ok(prefix) = std::env::var(env_var) {
            let candidate = Path::new(&prefix).join("bin").join("python");
            if let Some(path) = verify(&candidate) {
                return Ok(path);
            }
            tried.push(format!("{env_var} ({})", candidate.display()));
        }
    }

    for name in PYTHON_NAMES {
        if let Ok(candidate) = which::which(name) {
            if let Some(path) = verify(&candidate) {
                return Ok(path);
            }
            tried.push(format!("{name} ({})", candidate.display()));
        } else {
            tried.push((*name).to_string());
        }
    }

    Err(PyscoutError::python_not_found(format!(
        "tried {}",
        tried.join(", ")
    )))
}

/// Checks that a candidate exists, is executable, and is recent enough.
fn verify(path: &Path) -> Option<PathBuf> {
    if !is_executable(path) {
        return None;
    }
    let version = probe_version(path)?;
    if !version.meets_minimum() {
        debug!(path = %path.display(), %version, "interpreter below minimum version");
        return None;
    }
    debug!(path = %path.display(), %version, "selected interpreter");
    Some(path.to_path_buf())
}

/// Runs `<python> --version` and parses the reported version. Older
/// interpreters print it to stderr, so both streams are checked.
fn probe_version(path: &Path) -> Option<PythonVersion> {
    let output = Command::new(path).arg("--version").output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    PythonVersion::parse(&stdout).or_else(|| PythonVersion::parse(&stderr))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod version_tests {
        use super::*;

        #[test]
        fn parses_standard_version_output() {
            let version = PythonVersion::parse("Python 3.11.2").unwrap();
            assert_eq!((version.major, version.minor, version.patch), (3, 11, 2));
        }

        #[test]
        fn parses_bare_version_strings() {
            let version = PythonVersion::parse("3.8.0\n").unwrap();
            assert_eq!((version.major, version.minor, version.patch), (3, 8, 0));
        }

        #[test]
        fn parses_prerelease_suffixes() {
            let version = PythonVersion::parse("Python 3.12.0rc1").unwrap();
            assert_eq!((version.major, version.minor, version.patch), (3, 12, 0));
        }

        #[test]
        fn missing_patch_defaults_to_zero() {
            let version = PythonVersion::parse("Python 3.9").unwrap();
            assert_eq!(version.patch, 0);
        }

        #[test]
        fn garbage_is_rejected() {
            assert!(PythonVersion::parse("PyPy 7.3").is_none());
            assert!(PythonVersion::parse("").is_none());
        }

        #[test]
        fn minimum_version_check() {
            assert!(PythonVersion::parse("Python 3.8.0").unwrap().meets_minimum());
            assert!(PythonVersion::parse("Python 3.13.1").unwrap().meets_minimum());
            assert!(!PythonVersion::parse("Python 3.7.9").unwrap().meets_minimum());
            assert!(!PythonVersion::parse("Python 2.7.18").unwrap().meets_minimum());
        }

        #[test]
        fn versions_format_back_to_dotted_form() {
            let version = PythonVersion::parse("Python 3.11.2").unwrap();
            assert_eq!(version.to_string(), "3.11.2");
        }
    }

    mod discovery_tests {
        use super::*;

        #[test]
        fn discovers_an_interpreter_when_python3_exists() {
            // Skip when no interpreter is installed.
            if which::which("python3").is_err() {
                return;
            }
            let path = discover(None).unwrap();
            assert!(is_executable(&path));
            assert!(probe_version(&path).unwrap().meets_minimum());
        }

        #[test]
        fn bad_override_fails_instead_of_falling_through() {
            let error = discover(Some(Path::new("/no/such/python"))).unwrap_err();
            assert!(matches!(error, PyscoutError::PythonNotFound { .. }));
        }
    }
}
