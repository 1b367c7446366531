//! The engine's internal error type.
//!
//! Nothing here crosses the process boundary: every site that produces one
//! of these either prints a diagnostic and continues (parent-side errors)
//! or is translated into a non-zero child exit (child-side errors). See
//! `spec.md` §7.

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// PATH search found nothing executable for this name.
    Resolve(String),
    /// Opening a redirection target failed.
    Redirect(String),
    /// `pipe()` failed in the parent.
    Pipe(std::io::Error),
    /// `fork`/`spawn` failed in the parent.
    Spawn(std::io::Error),
    /// `cd` failed (bad path, unresolved, or chdir error).
    Cd(String),
    /// Miscellaneous I/O failure (cwd query, waitpid, kill).
    Io(std::io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Resolve(name) => write!(f, "ERROR: Failed to execute program: {name}"),
            EngineError::Redirect(msg) => write!(f, "{msg}"),
            EngineError::Pipe(e) => write!(f, "failed to create pipe: {e}"),
            EngineError::Spawn(e) => write!(f, "failed to spawn: {e}"),
            EngineError::Cd(msg) => write!(f, "cd: {msg}"),
            EngineError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Pipe(e) | EngineError::Spawn(e) | EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}
