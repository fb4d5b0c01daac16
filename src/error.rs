//! Error type shared by the appender and the extractor.
//!
//! Every variant carries enough context (operation, path, block name) to
//! diagnose the failure without a log line; nothing in this crate logs an
//! error and carries on.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, ContainerError>;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("{op} failed on {}{}: {source}", .path.display(), fmt_offset(.offset))]
    Io {
        op:     &'static str,
        path:   PathBuf,
        offset: Option<u64>,
        source: io::Error,
    },

    #[error("Block {0:?} has already been appended")]
    DuplicateName(String),

    #[error("Cannot derive a block name from {}", .0.display())]
    InvalidName(PathBuf),

    #[error("Malformed container {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Container {} has format version {found:?}, expected {expected:?}", .path.display())]
    VersionMismatch {
        path:     PathBuf,
        expected: String,
        found:    String,
    },

    #[error("Block not found: {0:?}")]
    NotFound(String),

    #[error("Codec error in block {name:?}: {source}")]
    Codec { name: String, source: CodecError },

    #[error("Appender is already closed")]
    Closed,
}

impl ContainerError {
    pub(crate) fn io(op: &'static str, path: &Path, offset: Option<u64>, source: io::Error) -> Self {
        ContainerError::Io { op, path: path.to_owned(), offset, source }
    }

    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        ContainerError::Malformed { path: path.to_owned(), reason: reason.into() }
    }
}

fn fmt_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(o) => format!(" at offset {o}"),
        None    => String::new(),
    }
}

/// Attach operation/path context to a raw `io::Result`.
pub(crate) trait IoContext<T> {
    fn io_context(self, op: &'static str, path: &Path, offset: Option<u64>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, op: &'static str, path: &Path, offset: Option<u64>) -> Result<T> {
        self.map_err(|e| ContainerError::io(op, path, offset, e))
    }
}
