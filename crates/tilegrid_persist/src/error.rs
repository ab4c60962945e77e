use std::io;

use tilegrid_shared::{BlockId, FieldType, Layer, WorldError};

/// Fatal errors from the binary and text codecs.
///
/// Length mismatches in binary input are not errors; they are reported
/// through [`crate::binary::DecodeWarning`] so older or foreign data can
/// still be loaded.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    World(#[from] WorldError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("block `{block}` declares field type `{field_type}`, which this codec cannot read or write")]
    UnsupportedFieldType { block: String, field_type: FieldType },

    #[error("negative block id {raw} at byte offset {offset}")]
    NegativeBlockId { raw: i32, offset: u64 },

    #[error("block id {0} does not fit the 32-bit signed id slot")]
    BlockIdTooLarge(BlockId),

    #[error("malformed cell token `{token}` in {layer} layer: {reason}")]
    MalformedCellToken {
        layer: Layer,
        token: String,
        reason: &'static str,
    },

    #[error("palette index {index} is out of range for a palette of {len} entries")]
    PaletteIndexOutOfRange { index: u32, len: usize },

    #[error("{layer} layer holds {actual} cells, expected {expected}")]
    CellCountMismatch {
        layer: Layer,
        expected: u64,
        actual: u64,
    },

    #[error("unsupported file version {found}; current version is {current}")]
    UnsupportedFileVersion { found: u32, current: u32 },

    #[error("metadata key `{0}` collides with a reserved document field")]
    ReservedMetadataKey(String),

    #[error("invalid world document: {0}")]
    Json(#[from] serde_json::Error),
}
