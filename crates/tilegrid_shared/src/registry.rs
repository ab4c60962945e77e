use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block::{BlockId, FieldType, EMPTY_BLOCK_NAME};
use crate::error::WorldError;

/// Block used by `World::clear` to mark the outer edge unless a registry
/// names a different one.
pub const DEFAULT_BORDER_BLOCK: &str = "border";

/// Name/id lookup plus the auxiliary field schema of every block type.
///
/// Every operation that needs to resolve a block takes the registry as an
/// explicit argument, so tests can run against small synthetic tables.
pub trait BlockRegistry {
    fn id_of(&self, name: &str) -> Result<BlockId, WorldError>;

    fn name_of(&self, id: BlockId) -> Result<&str, WorldError>;

    /// Declared field types for `name`, empty when none are registered.
    fn field_schema_of(&self, name: &str) -> &[FieldType];

    fn border_block_name(&self) -> &str {
        DEFAULT_BORDER_BLOCK
    }

    /// Schema for a block id. Id 0 never carries data, whatever the
    /// registry says about it.
    fn schema_for_id(&self, id: BlockId) -> Result<&[FieldType], WorldError> {
        if id.is_empty() {
            return Ok(&[]);
        }
        let name = self.name_of(id)?;
        Ok(self.field_schema_of(name))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldType>,
}

impl BlockDefinition {
    pub fn new(name: &str) -> Self {
        Self::with_fields(name, Vec::new())
    }

    pub fn with_fields(name: &str, fields: Vec<FieldType>) -> Self {
        Self {
            name: name.to_string(),
            fields,
        }
    }
}

/// On-disk form of a block table.
///
/// ```toml
/// border_block = "border"
///
/// [[blocks]]
/// name = "border"
///
/// [[blocks]]
/// name = "sign"
/// fields = ["i32", "i32"]
/// ```
///
/// Ids follow declaration order starting at 1; `empty` is implicit.
#[derive(Debug, Deserialize)]
struct BlockManifest {
    #[serde(default)]
    border_block: Option<String>,
    #[serde(default)]
    blocks: Vec<BlockDefinition>,
}

/// In-memory registry with sequential ids. Id 0 is always `empty`.
#[derive(Debug, Clone)]
pub struct BlockTable {
    definitions: Vec<BlockDefinition>,
    by_name: FxHashMap<String, BlockId>,
    border_block: String,
}

impl BlockTable {
    pub fn new() -> Self {
        let mut by_name = FxHashMap::default();
        by_name.insert(EMPTY_BLOCK_NAME.to_string(), BlockId::EMPTY);
        Self {
            definitions: vec![BlockDefinition::new(EMPTY_BLOCK_NAME)],
            by_name,
            border_block: DEFAULT_BORDER_BLOCK.to_string(),
        }
    }

    pub fn with_border_block(mut self, name: &str) -> Self {
        self.border_block = name.to_string();
        self
    }

    pub fn register(&mut self, definition: BlockDefinition) -> Result<BlockId, WorldError> {
        if self.by_name.contains_key(definition.name.as_str()) {
            return Err(WorldError::DuplicateBlockName(definition.name));
        }

        let id = u32::try_from(self.definitions.len())
            .map(BlockId)
            .map_err(|_| WorldError::Manifest("block table exceeded BlockId capacity".to_string()))?;

        self.by_name.insert(definition.name.clone(), id);
        self.definitions.push(definition);
        Ok(id)
    }

    pub fn from_toml_str(src: &str) -> Result<Self, WorldError> {
        let manifest: BlockManifest =
            toml::from_str(src).map_err(|err| WorldError::Manifest(err.to_string()))?;

        let mut table = Self::new();
        if let Some(border) = manifest.border_block {
            table.border_block = border;
        }

        for definition in manifest.blocks {
            if definition.name == EMPTY_BLOCK_NAME {
                if !definition.fields.is_empty() {
                    warn!("Ignoring field schema declared for the `{EMPTY_BLOCK_NAME}` block");
                }
                continue;
            }
            table.register(definition)?;
        }

        debug!(
            "Loaded block table with {} blocks (border block `{}`)",
            table.definitions.len(),
            table.border_block
        );
        Ok(table)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        let path = path.as_ref();
        let src = fs::read_to_string(path)
            .map_err(|err| WorldError::Manifest(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml_str(&src)
    }

    pub fn get_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    pub fn definition(&self, id: BlockId) -> Option<&BlockDefinition> {
        self.definitions.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BlockDefinition)> {
        self.definitions
            .iter()
            .enumerate()
            .map(|(index, definition)| (BlockId(index as u32), definition))
    }

    /// Number of registered blocks, `empty` included.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for BlockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistry for BlockTable {
    fn id_of(&self, name: &str) -> Result<BlockId, WorldError> {
        self.get_by_name(name)
            .ok_or_else(|| WorldError::UnknownBlockName(name.to_string()))
    }

    fn name_of(&self, id: BlockId) -> Result<&str, WorldError> {
        self.definition(id)
            .map(|definition| definition.name.as_str())
            .ok_or(WorldError::UnknownBlockId(id))
    }

    fn field_schema_of(&self, name: &str) -> &[FieldType] {
        self.get_by_name(name)
            .and_then(|id| self.definition(id))
            .map(|definition| definition.fields.as_slice())
            .unwrap_or(&[])
    }

    fn border_block_name(&self) -> &str {
        &self.border_block
    }
}
