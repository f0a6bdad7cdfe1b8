//! Error types for the nrbf-core library.
//!
//! Every failure aborts the whole decode. The variants are split so callers can
//! tell corrupted input apart from input that is well formed but uses record
//! kinds this crate refuses to handle.

use crate::record::RecordType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nrbf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all nrbf operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The payload breaks the record grammar
    #[error("format violation at offset {offset}: {details}")]
    FormatViolation {
        /// Byte offset where the error occurred
        offset: u64,
        /// Detailed description of the issue
        details: String,
    },

    /// A recognized record kind that is deliberately not supported
    #[error("unsupported record {record_type:?} at offset {offset}")]
    UnsupportedRecord {
        /// Byte offset of the record tag
        offset: u64,
        /// The rejected record kind
        record_type: RecordType,
    },

    /// An array declares more elements than any array may hold
    #[error("array declares {elements} elements, more than the maximum of {max}")]
    ArrayTooLarge {
        /// Element count accumulated so far (saturated at the first excess)
        elements: u64,
        /// Maximum accepted element count
        max: u64,
    },

    /// A rank, length, count or primitive value is outside accepted bounds
    #[error("invalid value at offset {offset}: {details}")]
    InvalidValue {
        /// Byte offset where the error occurred
        offset: u64,
        /// Detailed description of the issue
        details: String,
    },

    /// The declared root identity was never produced
    #[error("payload ended without producing root record {root_id}")]
    MissingRoot {
        /// Root identity declared by the header
        root_id: i32,
    },

    /// A string or char payload is not valid UTF-8
    #[error("invalid UTF-8 at offset {offset}: {source}")]
    TextEncodingInvalid {
        /// Byte offset of the text payload
        offset: u64,
        /// Underlying decoding error
        #[source]
        source: std::str::Utf8Error,
    },

    /// The byte source ended in the middle of a record
    #[error("unexpected end of stream at offset {offset}")]
    UnexpectedEnd {
        /// Byte offset at which more input was required
        offset: u64,
    },

    /// A type name does not follow the assembly-qualified name grammar
    #[error("invalid type name '{name}': {details}")]
    InvalidTypeName {
        /// The offending type name
        name: String,
        /// Detailed description of the issue
        details: String,
    },

    /// The root record is not of the kind the caller asked for
    #[error("expected root record to be {expected}, found {found}")]
    UnexpectedRootKind {
        /// Kind the caller required
        expected: &'static str,
        /// Kind actually decoded
        found: &'static str,
    },

    /// Underlying I/O failure from the byte source
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new format violation error
    pub fn format_violation(offset: u64, details: impl Into<String>) -> Self {
        Self::FormatViolation {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new invalid value error
    pub fn invalid_value(offset: u64, details: impl Into<String>) -> Self {
        Self::InvalidValue {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new invalid type name error
    pub fn invalid_type_name(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidTypeName {
            name: name.into(),
            details: details.into(),
        }
    }

    /// Returns true if the error means the payload itself is corrupt or hostile,
    /// as opposed to unsupported, unreadable or of an unexpected shape
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::FormatViolation { .. }
                | Self::ArrayTooLarge { .. }
                | Self::InvalidValue { .. }
                | Self::MissingRoot { .. }
                | Self::TextEncodingInvalid { .. }
                | Self::UnexpectedEnd { .. }
                | Self::InvalidTypeName { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::format_violation(17, "duplicate record id 3");
        assert!(err.to_string().contains("offset 17"));
        assert!(err.to_string().contains("duplicate record id 3"));
    }

    #[test]
    fn test_is_corruption() {
        assert!(Error::invalid_value(0, "rank 0").is_corruption());
        assert!(Error::MissingRoot { root_id: 1 }.is_corruption());
        assert!(!Error::UnsupportedRecord {
            offset: 0,
            record_type: RecordType::MethodCall,
        }
        .is_corruption());
        assert!(!Error::UnexpectedRootKind {
            expected: "class",
            found: "array",
        }
        .is_corruption());
    }
}
