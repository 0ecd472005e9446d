/*!
Error types for the reconciliation engine
*/

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::entry::Entry;

/// Top-level errors surfaced by list, ledger, document and policy operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input is not an `http://` or `https://` URL with a host.
    #[error("invalid entry {input:?}: {reason}")]
    InvalidEntry { input: String, reason: &'static str },

    /// The entry is already part of the active list.
    #[error("{0} is already in the site list")]
    DuplicateEntry(Entry),

    /// The deletion ledger could not be read or rewritten.
    #[error("ledger I/O error at {}: {source}", .path.display())]
    Ledger { path: PathBuf, source: io::Error },

    /// The site list document exists but could not be parsed.
    #[error("could not read site list {}: {source}", .path.display())]
    ConfigRead { path: PathBuf, source: DocumentError },

    /// The site list document could not be written or removed.
    #[error("could not write site list {}: {source}", .path.display())]
    ConfigWrite { path: PathBuf, source: DocumentError },

    /// The process lacks the rights needed to write the policy store.
    #[error("administrator rights are required to update the policy store")]
    NotElevated,
}

/// Errors raised while encoding or decoding the site list document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("document has no root element")]
    MissingRoot,

    /// Input ended while elements were still open.
    #[error("document ends with {0} unclosed element(s)")]
    Unclosed(usize),

    #[error("unexpected element <{0}> after the root element")]
    TrailingElement(String),
}

/// A single failed operation against the policy store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("policy command failed: {0}")]
    Command(String),

    #[error("policy store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("policy store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A named policy value paired with the reason it could not be written.
#[derive(Debug)]
pub struct ValueFailure {
    pub value: String,
    pub error: StoreError,
}

impl fmt::Display for ValueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value, self.error)
    }
}

/// Convergence failures. A partial failure leaves the policy store inconsistent.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy store partially updated: {} succeeded, failed: {}", .succeeded.join(", "), describe(.failed))]
    PartialFailure {
        succeeded: Vec<String>,
        failed: Vec<ValueFailure>,
    },

    #[error("policy store update failed: {}", describe(.failed))]
    TotalFailure { failed: Vec<ValueFailure> },
}

fn describe(failed: &[ValueFailure]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
