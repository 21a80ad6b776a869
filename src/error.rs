use std::path::PathBuf;
use thiserror::Error;

use crate::model::TypeKey;

/// Problems found while decoding the bytes of a single `.class` resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("not a class file (magic {0:#010x})")]
    BadMagic(u32),

    #[error("unexpected end of class file at offset {0}")]
    Truncated(usize),

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("constant pool index {index} is not a {expected}")]
    BadConstant { index: u16, expected: &'static str },

    #[error("unknown annotation element tag '{0}'")]
    UnknownElementTag(char),

    #[error("malformed modified UTF-8 in constant {0}")]
    BadUtf8(u16),

    #[error("annotation element values nested deeper than {0}")]
    NestedTooDeep(usize),
}

/// Every recoverable failure of the discovery pipeline.
///
/// None of these abort a scan or a merge. They are logged where they happen
/// and collected into the scan/merge reports for callers that want to inspect
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("failed to list class resources under '{package}' in {}: {reason}", .entry.display())]
    ScanIo {
        package: String,
        entry: PathBuf,
        reason: String,
    },

    #[error("failed to read metadata of {resource}: {source}")]
    Metadata {
        resource: String,
        #[source]
        source: DecodeError,
    },

    #[error("cannot resolve type {class_name}: {reason}")]
    TypeResolution { class_name: String, reason: String },

    #[error("{class_name} carries {marker} without an integer 'value'")]
    MissingTypeKey { class_name: String, marker: String },

    #[error("type key {key} already taken by {existing}, rejecting {rejected}")]
    DuplicateKey {
        key: TypeKey,
        existing: String,
        rejected: String,
    },

    #[error("duplicate scan of {class_name} (key {key}), ignoring")]
    DuplicateValue { key: TypeKey, class_name: String },
}

impl ScanError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::ScanIo { .. } => "scan_io",
            ScanError::Metadata { .. } => "metadata",
            ScanError::TypeResolution { .. } => "type_resolution",
            ScanError::MissingTypeKey { .. } => "missing_type_key",
            ScanError::DuplicateKey { .. } => "duplicate_key",
            ScanError::DuplicateValue { .. } => "duplicate_value",
        }
    }
}
