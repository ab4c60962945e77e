pub mod binary;
pub mod error;
pub mod text;
pub mod versioning;

pub use binary::{BinaryCodec, DecodeReport, DecodeWarning};
pub use error::CodecError;
pub use text::{LayerStrings, TextCodec, WorldDocument};
