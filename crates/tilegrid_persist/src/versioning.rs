use tracing::debug;

use crate::error::CodecError;

/// `fileVersion` written into every world document.
pub const CURRENT_FILE_VERSION: u32 = 0;

/// Accepts documents this build can read. There is a single text format
/// so far; anything newer is refused rather than half-read.
pub fn check_file_version(found: u32) -> Result<(), CodecError> {
    if found == CURRENT_FILE_VERSION {
        return Ok(());
    }

    debug!("Rejecting world document with file version {found}");
    Err(CodecError::UnsupportedFileVersion {
        found,
        current: CURRENT_FILE_VERSION,
    })
}
