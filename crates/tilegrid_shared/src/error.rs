use crate::block::{BlockId, FieldType};

/// Errors raised by the block model, the registry and world operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("unknown block name `{0}`")]
    UnknownBlockName(String),

    #[error("unknown block id {0}")]
    UnknownBlockId(BlockId),

    #[error("position ({x}, {y}) is outside the {width}x{height} world")]
    OutOfRange {
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    },

    #[error("block `{name}` declares {expected} auxiliary fields, got {actual}")]
    FieldCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("block `{name}` field {index} is declared as {expected}, got {actual}")]
    FieldTypeMismatch {
        name: String,
        index: usize,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("world dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("block name `{0}` is already registered")]
    DuplicateBlockName(String),

    #[error("invalid block manifest: {0}")]
    Manifest(String),
}
