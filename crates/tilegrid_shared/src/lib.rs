pub mod block;
pub mod coords;
pub mod error;
pub mod registry;
pub mod world;

pub use block::{Block, BlockId, FieldType, FieldValue, EMPTY_BLOCK_NAME};
pub use coords::{Layer, WorldPosition};
pub use error::WorldError;
pub use registry::{BlockDefinition, BlockRegistry, BlockTable};
pub use world::World;
