//! Error definitions.
use std::error::Error;
use std::{fmt, io, result};

use crate::DocId;

/// A specialized Result type for this library.
pub type Result<T, E = EngineError> = result::Result<T, E>;

/// Errors in neardup.
///
/// All variants other than [`EngineError::Config`] are recoverable by the
/// caller; a configuration error prevents engine creation entirely.
#[derive(Debug)]
pub enum EngineError {
    /// Invalid engine configuration. The engine is never created.
    Config(ConfigError),
    /// A document produced an empty shingle set and was not indexed.
    EmptyDocument(EmptyDocumentError),
    /// An insert hit an already-indexed id. The existing entry is untouched.
    DuplicateId(IdError),
    /// A remove, query, or verification referenced an unknown id.
    NotFound(IdError),
    /// Export or import failed. The in-memory engine is untouched.
    Persist(PersistError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::EmptyDocument(e) => e.fmt(f),
            Self::DuplicateId(e) => write!(f, "DuplicateIdError: id={}", e.id),
            Self::NotFound(e) => write!(f, "NotFoundError: id={}", e.id),
            Self::Persist(e) => e.fmt(f),
        }
    }
}

impl Error for EngineError {}

impl EngineError {
    pub(crate) const fn config(msg: &'static str) -> Self {
        Self::Config(ConfigError { msg })
    }

    pub(crate) const fn empty_document(id: Option<DocId>) -> Self {
        Self::EmptyDocument(EmptyDocumentError { id })
    }

    pub(crate) const fn duplicate_id(id: DocId) -> Self {
        Self::DuplicateId(IdError { id })
    }

    pub(crate) const fn not_found(id: DocId) -> Self {
        Self::NotFound(IdError { id })
    }

    pub(crate) fn persist<S: Into<String>>(msg: S) -> Self {
        Self::Persist(PersistError { msg: msg.into() })
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        Self::persist(e.to_string())
    }
}

/// Error used when the engine configuration is invalid.
#[derive(Debug)]
pub struct ConfigError {
    msg: &'static str,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConfigError: {}", self.msg)
    }
}

/// Error used when a document yields no shingles.
#[derive(Debug)]
pub struct EmptyDocumentError {
    id: Option<DocId>,
}

impl fmt::Display for EmptyDocumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "EmptyDocumentError: id={id}"),
            None => write!(f, "EmptyDocumentError: query document"),
        }
    }
}

/// Error carrying the offending document id.
#[derive(Debug)]
pub struct IdError {
    id: DocId,
}

impl IdError {
    /// Gets the offending document id.
    pub const fn id(&self) -> DocId {
        self.id
    }
}

/// Error used when serialized engine state cannot be written or read.
#[derive(Debug)]
pub struct PersistError {
    msg: String,
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PersistError: {}", self.msg)
    }
}
