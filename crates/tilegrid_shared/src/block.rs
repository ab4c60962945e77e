use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::registry::BlockRegistry;

/// Name of the sentinel block that always owns id 0.
pub const EMPTY_BLOCK_NAME: &str = "empty";

#[repr(transparent)]
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const EMPTY: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Declared type of one auxiliary field in a block's schema.
///
/// Registries loaded from a manifest may name types this build has no
/// representation for; those are kept as `Unknown` so the codecs can
/// report them instead of guessing a width.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Int32,
    Unknown(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Int32 => "i32",
            FieldType::Unknown(name) => name,
        }
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "i32" | "int32" => FieldType::Int32,
            _ => FieldType::Unknown(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Int32 => "i32".to_string(),
            FieldType::Unknown(name) => name,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single auxiliary value carried by a block.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Int32(i32),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int32(_) => FieldType::Int32,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int32(value) => value.fmt(f),
        }
    }
}

/// The value stored in one cell: a block type plus its auxiliary data.
///
/// Blocks are never mutated once built. Worlds hold them behind `Arc` and
/// replace whole cells, which is what lets `World::copy` share instances.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Block {
    id: BlockId,
    data: Vec<FieldValue>,
}

impl Block {
    pub const EMPTY: Self = Self {
        id: BlockId::EMPTY,
        data: Vec::new(),
    };

    /// A block with no auxiliary data. No registry lookup happens here.
    pub const fn new(id: BlockId) -> Self {
        Self {
            id,
            data: Vec::new(),
        }
    }

    pub fn from_name<R>(registry: &R, name: &str) -> Result<Self, WorldError>
    where
        R: BlockRegistry + ?Sized,
    {
        Ok(Self::new(registry.id_of(name)?))
    }

    /// Builds a block whose data is checked against the registry schema,
    /// both in length and in the kind of every value.
    pub fn with_data<R>(registry: &R, id: BlockId, data: Vec<FieldValue>) -> Result<Self, WorldError>
    where
        R: BlockRegistry + ?Sized,
    {
        let block = Self { id, data };
        block.check_schema(registry)?;
        Ok(block)
    }

    /// Checks the data against the registry schema, in length and in the
    /// kind of every value. Blocks stored through `World::set_block` have
    /// not been through this.
    pub fn check_schema<R>(&self, registry: &R) -> Result<(), WorldError>
    where
        R: BlockRegistry + ?Sized,
    {
        let schema = registry.schema_for_id(self.id)?;
        if schema.len() != self.data.len() {
            return Err(WorldError::FieldCountMismatch {
                name: registry.name_of(self.id)?.to_string(),
                expected: schema.len(),
                actual: self.data.len(),
            });
        }

        for (index, (expected, value)) in schema.iter().zip(&self.data).enumerate() {
            let actual = value.field_type();
            if *expected != actual {
                return Err(WorldError::FieldTypeMismatch {
                    name: registry.name_of(self.id)?.to_string(),
                    index,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(())
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn data(&self) -> &[FieldValue] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Same id and elementwise-equal data of equal length.
    pub fn is_same_as(&self, other: &Block) -> bool {
        self == other
    }

    pub fn name<'r, R>(&self, registry: &'r R) -> Result<&'r str, WorldError>
    where
        R: BlockRegistry + ?Sized,
    {
        registry.name_of(self.id)
    }

    /// Number of auxiliary fields this block type expects. Unresolvable
    /// ids count as carrying no data.
    pub fn field_count<R>(&self, registry: &R) -> usize
    where
        R: BlockRegistry + ?Sized,
    {
        registry
            .schema_for_id(self.id)
            .map(<[FieldType]>::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Block, BlockId, FieldType, FieldValue};
    use crate::error::WorldError;
    use crate::registry::{BlockDefinition, BlockTable};

    fn table() -> BlockTable {
        let mut table = BlockTable::new();
        table
            .register(BlockDefinition::new("stone"))
            .expect("register stone");
        table
            .register(BlockDefinition::with_fields(
                "sign",
                vec![FieldType::Int32, FieldType::Int32],
            ))
            .expect("register sign");
        table
            .register(BlockDefinition::with_fields(
                "portal",
                vec![FieldType::Unknown("f64".to_string())],
            ))
            .expect("register portal");
        table
    }

    #[test]
    fn is_same_as_compares_id_and_data() {
        let a = Block::new(BlockId(1));
        let b = Block::new(BlockId(1));
        assert!(a.is_same_as(&b));
        assert!(!a.is_same_as(&Block::new(BlockId(2))));

        let table = table();
        let sign = table.get_by_name("sign").expect("registered");
        let left = Block::with_data(&table, sign, vec![FieldValue::Int32(1), FieldValue::Int32(2)])
            .expect("valid sign");
        let right = Block::with_data(&table, sign, vec![FieldValue::Int32(1), FieldValue::Int32(2)])
            .expect("valid sign");
        let other = Block::with_data(&table, sign, vec![FieldValue::Int32(1), FieldValue::Int32(3)])
            .expect("valid sign");
        assert!(left.is_same_as(&right));
        assert!(!left.is_same_as(&other));
        assert!(!left.is_same_as(&Block::new(sign)));
    }

    #[test]
    fn from_name_resolves_through_the_registry() {
        let table = table();
        let stone = Block::from_name(&table, "stone").expect("stone is registered");
        assert_eq!(stone.id(), BlockId(1));
        assert_eq!(stone.name(&table), Ok("stone"));
        assert!(stone.data().is_empty());

        let err = Block::from_name(&table, "lava").expect_err("lava is not registered");
        assert_eq!(err, WorldError::UnknownBlockName("lava".to_string()));
    }

    #[test]
    fn name_of_unmapped_id_fails() {
        let table = table();
        let err = Block::new(BlockId(99)).name(&table).expect_err("id 99 is unmapped");
        assert_eq!(err, WorldError::UnknownBlockId(BlockId(99)));
    }

    #[test]
    fn field_count_falls_back_to_zero() {
        let table = table();
        assert_eq!(Block::new(table.get_by_name("sign").expect("registered")).field_count(&table), 2);
        assert_eq!(Block::new(table.get_by_name("stone").expect("registered")).field_count(&table), 0);
        assert_eq!(Block::new(BlockId(99)).field_count(&table), 0);
        assert_eq!(Block::EMPTY.field_count(&table), 0);
    }

    #[test]
    fn with_data_rejects_wrong_length() {
        let table = table();
        let err = Block::with_data(&table, table.get_by_name("sign").expect("registered"), vec![FieldValue::Int32(1)])
            .expect_err("sign needs two fields");
        assert_eq!(
            err,
            WorldError::FieldCountMismatch {
                name: "sign".to_string(),
                expected: 2,
                actual: 1,
            }
        );

        let err = Block::with_data(&table, BlockId::EMPTY, vec![FieldValue::Int32(1)])
            .expect_err("empty never carries data");
        assert!(matches!(err, WorldError::FieldCountMismatch { expected: 0, .. }));
    }

    #[test]
    fn with_data_rejects_unrepresentable_field_types() {
        let table = table();
        let err = Block::with_data(&table, table.get_by_name("portal").expect("registered"), vec![FieldValue::Int32(1)])
            .expect_err("portal field is not an i32");
        assert!(matches!(err, WorldError::FieldTypeMismatch { index: 0, .. }));
    }

    #[test]
    fn check_schema_catches_blocks_built_without_validation() {
        let table = table();
        let sign = table.get_by_name("sign").expect("registered");

        assert!(Block::new(table.get_by_name("stone").expect("registered"))
            .check_schema(&table)
            .is_ok());
        assert_eq!(
            Block::new(sign).check_schema(&table),
            Err(WorldError::FieldCountMismatch {
                name: "sign".to_string(),
                expected: 2,
                actual: 0,
            })
        );
        assert_eq!(
            Block::new(BlockId(99)).check_schema(&table),
            Err(WorldError::UnknownBlockId(BlockId(99)))
        );
    }

    #[test]
    fn field_type_names_parse_and_print() {
        assert_eq!(FieldType::from("i32".to_string()), FieldType::Int32);
        assert_eq!(FieldType::from("int32".to_string()), FieldType::Int32);
        assert_eq!(
            FieldType::from("string".to_string()),
            FieldType::Unknown("string".to_string())
        );
        assert_eq!(FieldType::Int32.to_string(), "i32");
        assert_eq!(FieldValue::Int32(-7).to_string(), "-7");
    }
}
