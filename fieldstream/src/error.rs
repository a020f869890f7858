//! Error types for indexing, configuration and transformation.
//!
//! - [`ExtractError`] - top-level error returned by every fallible operation
//! - [`ConfigError`] - selection / transform registry problems, detected eagerly
//! - [`ParseError`] - malformed records and failed field reads
//! - [`TransformError`] - a transform rejected its input
//! - [`PreconditionError`] - operations invoked out of order or on the wrong file

use std::path::PathBuf;

use thiserror::Error;

use crate::common::{FieldId, RecordKey};

/// Top-level error type. Every variant is fatal to the current run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("transform error in record {record}, field {field}: {source}")]
    Transform {
        record: RecordKey,
        field: String,
        #[source]
        source: TransformError,
    },

    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no fields selected for extraction")]
    EmptySelection,

    #[error("field {0} is selected more than once")]
    DuplicateField(String),

    #[error("field {0} is a reserved identifier and cannot be used as a feature")]
    ReservedField(String),

    #[error("field {field} is outside the catalog ({catalog_len} fields)")]
    UnknownFieldId { field: FieldId, catalog_len: usize },

    #[error("unknown field name {0:?}")]
    UnknownFieldName(String),

    #[error("selected field {0} has no transform chain")]
    MissingChain(String),

    #[error("transform chain registered for unselected field {0}")]
    UnselectedChain(String),

    #[error("more than one transform chain registered for field {0}")]
    DuplicateChain(String),

    #[error("field {0}: one-hot must be the first step of its chain")]
    MisplacedOneHot(String),

    #[error("unknown text encoding {0:?}")]
    UnknownEncoding(String),

    #[error("encoding {0} cannot be used to encode output values")]
    UnsupportedEncoding(&'static str),

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("failed to parse selection file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("record {record}: expected at least {expected} fields, found {found}")]
    MissingFields {
        record: RecordKey,
        expected: usize,
        found: usize,
    },

    #[error(
        "record {record}, field {field}: failed to read {len} bytes at offset {offset}: {source}"
    )]
    Read {
        record: RecordKey,
        field: String,
        offset: u64,
        len: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("record {record}: field at position {position} is {len} bytes, over the 4 GiB span limit")]
    FieldTooLong {
        record: RecordKey,
        position: usize,
        len: usize,
    },

    #[error("record {record}, field {field}: value is not valid UTF-8")]
    InvalidUtf8 { record: RecordKey, field: String },

    #[error("record {record}: slot {slot} is outside the selection ({width} fields)")]
    SlotOutOfRange {
        record: RecordKey,
        slot: usize,
        width: usize,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("{0:?} is not a number word (zero..nine)")]
    NotANumberWord(String),

    #[error("cannot parse {value:?} as {target}")]
    InvalidNumber { value: String, target: &'static str },

    #[error("{transform} expects {expected} input, got {found}")]
    TypeMismatch {
        transform: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{value:?} cannot be encoded as {encoding}")]
    Unencodable {
        value: String,
        encoding: &'static str,
    },

    #[error("category {0:?} was not seen while building the category map")]
    UnseenCategory(String),

    #[error("one-hot transform used without a category map")]
    MissingCategoryMap,

    #[error("{name}: {message}")]
    Custom { name: String, message: String },
}

#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("no file has been indexed")]
    NotIndexed,

    #[error(
        "{} is not the file last indexed ({})",
        .requested.display(),
        .indexed.display()
    )]
    FileMismatch {
        requested: PathBuf,
        indexed: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_carries_context() {
        let err = ExtractError::Transform {
            record: RecordKey(3),
            field: "price".into(),
            source: TransformError::InvalidNumber {
                value: "abc".into(),
                target: "float",
            },
        };
        assert_eq!(
            err.to_string(),
            "transform error in record 3, field price: cannot parse \"abc\" as float"
        );
    }

    #[test]
    fn test_config_error_converts() {
        let err: ExtractError = ConfigError::EmptySelection.into();
        assert!(matches!(err, ExtractError::Config(ConfigError::EmptySelection)));
    }

    #[test]
    fn test_file_mismatch_message() {
        let err = PreconditionError::FileMismatch {
            requested: PathBuf::from("/data/b.txt"),
            indexed: PathBuf::from("/data/a.txt"),
        };
        assert_eq!(
            err.to_string(),
            "/data/b.txt is not the file last indexed (/data/a.txt)"
        );
    }
}
