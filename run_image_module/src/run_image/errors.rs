use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RunImageError {
    Io(io::Error),
    EmptyPrompt,
    EmptyCommand,
    InvalidPath {
        label: &'static str,
        path: PathBuf,
        reason: &'static str,
    },
    CommandNotFound {
        program: String,
    },
    CommandFailed {
        status: Option<i32>,
        output: String,
    },
    CommandTimeout {
        timeout_secs: u64,
        output: String,
    },
    OutputMissing {
        path: PathBuf,
        output: String,
    },
    InvalidOutput {
        path: PathBuf,
        size: u64,
    },
}

impl fmt::Display for RunImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunImageError::Io(err) => write!(f, "I/O error: {}", err),
            RunImageError::EmptyPrompt => write!(f, "Prompt must not be empty."),
            RunImageError::EmptyCommand => write!(f, "Image command is not configured."),
            RunImageError::InvalidPath {
                label,
                path,
                reason,
            } => write!(
                f,
                "Invalid path for {}: {} ({})",
                label,
                path.display(),
                reason
            ),
            RunImageError::CommandNotFound { program } => {
                write!(f, "Image command not found: {}", program)
            }
            RunImageError::CommandFailed { status, output } => write!(
                f,
                "Image command failed (status: {:?}). Output tail:\n{}",
                status, output
            ),
            RunImageError::CommandTimeout {
                timeout_secs,
                output,
            } => write!(
                f,
                "Image command timed out after {}s. Output tail:\n{}",
                timeout_secs, output
            ),
            RunImageError::OutputMissing { path, output } => write!(
                f,
                "Expected output not found: {}\nCommand output tail:\n{}",
                path.display(),
                output
            ),
            RunImageError::InvalidOutput { path, size } => write!(
                f,
                "Output {} is too small to be an image ({} bytes)",
                path.display(),
                size
            ),
        }
    }
}

impl std::error::Error for RunImageError {}

impl From<io::Error> for RunImageError {
    fn from(err: io::Error) -> Self {
        RunImageError::Io(err)
    }
}
