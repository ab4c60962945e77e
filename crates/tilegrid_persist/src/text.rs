//! Palette-compressed JSON world documents.
//!
//! ```json
//! {
//!   "fileVersion": 0,
//!   "width": 2,
//!   "height": 1,
//!   "palette": ["empty", "sign"],
//!   "layers": { "foreground": "0 1:4,-2 ", "background": "0 0 " }
//! }
//! ```
//!
//! Each layer string holds one token per cell in column-major order, every
//! token followed by a single space. A token is the palette index in
//! uppercase base 36, optionally followed by `:` and the block's field
//! values as decimal integers separated by `,`.

use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tilegrid_shared::coords::index_to_cell;
use tilegrid_shared::{
    Block, BlockId, BlockRegistry, FieldType, FieldValue, Layer, World, WorldError,
    EMPTY_BLOCK_NAME,
};
use tracing::debug;

use crate::error::CodecError;
use crate::versioning::{check_file_version, CURRENT_FILE_VERSION};

/// Top-level keys owned by the codec. Caller metadata may not use them.
pub const RESERVED_KEYS: [&str; 5] = ["fileVersion", "width", "height", "palette", "layers"];

const CELL_SEPARATOR: char = ' ';
const FIELD_DELIMITER: char = ':';
const FIELD_SEPARATOR: char = ',';
const BASE36_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerStrings {
    pub foreground: String,
    pub background: String,
}

impl LayerStrings {
    pub fn get(&self, layer: Layer) -> &str {
        match layer {
            Layer::Background => &self.background,
            Layer::Foreground => &self.foreground,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldDocument {
    #[serde(rename = "fileVersion")]
    pub file_version: u32,
    pub width: u32,
    pub height: u32,
    pub palette: Vec<String>,
    pub layers: LayerStrings,
    /// Caller-supplied keys, stored beside the reserved fields.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl WorldDocument {
    pub fn to_json_string(&self, pretty: bool) -> Result<String, CodecError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    pub fn from_json_str(src: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn write_json<W: Write>(&self, sink: W, pretty: bool) -> Result<(), CodecError> {
        let mut writer = BufWriter::new(sink);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self)?;
        } else {
            serde_json::to_writer(&mut writer, self)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_json<R: Read>(source: R) -> Result<Self, CodecError> {
        Ok(serde_json::from_reader(BufReader::new(source))?)
    }
}

pub struct TextCodec<'r, R: ?Sized> {
    registry: &'r R,
}

impl<'r, R> TextCodec<'r, R>
where
    R: BlockRegistry + ?Sized,
{
    pub fn new(registry: &'r R) -> Self {
        Self { registry }
    }

    pub fn encode(&self, world: &World, metadata: Map<String, Value>) -> Result<WorldDocument, CodecError> {
        if let Some(key) = metadata
            .keys()
            .find(|key| RESERVED_KEYS.contains(&key.as_str()))
        {
            return Err(CodecError::ReservedMetadataKey(key.clone()));
        }

        let mut palette = IndexSet::new();
        palette.insert(EMPTY_BLOCK_NAME.to_string());

        // Background first, matching the binary layout.
        let background = self.encode_layer(world, Layer::Background, &mut palette)?;
        let foreground = self.encode_layer(world, Layer::Foreground, &mut palette)?;

        debug!(
            "Encoded {}x{} world with a palette of {} blocks",
            world.width(),
            world.height(),
            palette.len()
        );

        Ok(WorldDocument {
            file_version: CURRENT_FILE_VERSION,
            width: world.width(),
            height: world.height(),
            palette: palette.into_iter().collect(),
            layers: LayerStrings {
                foreground,
                background,
            },
            metadata,
        })
    }

    fn encode_layer(
        &self,
        world: &World,
        layer: Layer,
        palette: &mut IndexSet<String>,
    ) -> Result<String, CodecError> {
        let mut out = String::with_capacity(world.cell_count() * 2);

        for (_, _, block) in world.cells(layer) {
            let name = block.name(self.registry)?;
            block.check_schema(self.registry)?;
            let index = match palette.get_index_of(name) {
                Some(index) => index,
                None => palette.insert_full(name.to_string()).0,
            };

            push_base36(&mut out, index);
            if let Some((first, rest)) = block.data().split_first() {
                out.push(FIELD_DELIMITER);
                push_field(&mut out, first);
                for value in rest {
                    out.push(FIELD_SEPARATOR);
                    push_field(&mut out, value);
                }
            }
            out.push(CELL_SEPARATOR);
        }

        Ok(out)
    }

    pub fn decode(&self, document: &WorldDocument) -> Result<World, CodecError> {
        check_file_version(document.file_version)?;
        let (width, height) = (document.width, document.height);
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidDimensions { width, height }.into());
        }

        // Token counts are bounded by the document size, so the dimensions
        // are checked against them before anything is allocated.
        let expected = u64::from(width) * u64::from(height);
        let mut layers = Vec::with_capacity(Layer::ALL.len());
        for layer in Layer::ALL {
            let tokens: Vec<&str> = document.layers.get(layer).split_terminator(CELL_SEPARATOR).collect();
            let actual = tokens.len() as u64;
            if actual != expected {
                return Err(CodecError::CellCountMismatch {
                    layer,
                    expected,
                    actual,
                });
            }
            layers.push((layer, tokens));
        }
        let mut world = World::new(width, height)?;

        let palette = document
            .palette
            .iter()
            .map(|name| self.registry.id_of(name))
            .collect::<Result<Vec<_>, WorldError>>()?;
        // Field-less blocks are shared per palette entry.
        let mut plain: Vec<Option<Arc<Block>>> = vec![None; palette.len()];

        for (layer, tokens) in layers {
            for (index, token) in tokens.into_iter().enumerate() {
                let (palette_index, fields) = parse_token(layer, token)?;
                let id = *palette
                    .get(palette_index as usize)
                    .ok_or(CodecError::PaletteIndexOutOfRange {
                        index: palette_index,
                        len: palette.len(),
                    })?;

                let block = if fields.is_none() && self.registry.schema_for_id(id)?.is_empty() {
                    let shared = plain[palette_index as usize].get_or_insert_with(|| Arc::new(Block::new(id)));
                    Arc::clone(shared)
                } else {
                    Arc::new(self.decode_block(layer, token, id, fields.unwrap_or(""))?)
                };

                let (x, y) = index_to_cell(index, world.height());
                world.set_block(x, y, layer, block)?;
            }
        }

        debug!(
            "Decoded {}x{} world document with a palette of {} blocks",
            world.width(),
            world.height(),
            palette.len()
        );
        Ok(world)
    }

    fn decode_block(&self, layer: Layer, token: &str, id: BlockId, fields: &str) -> Result<Block, CodecError> {
        let schema = self.registry.schema_for_id(id)?;
        let raw: Vec<&str> = if fields.is_empty() {
            Vec::new()
        } else {
            fields.split(FIELD_SEPARATOR).collect()
        };

        if raw.len() != schema.len() {
            return Err(WorldError::FieldCountMismatch {
                name: self.registry.name_of(id)?.to_string(),
                expected: schema.len(),
                actual: raw.len(),
            }
            .into());
        }

        let mut data = Vec::with_capacity(schema.len());
        for (field_type, raw) in schema.iter().zip(raw) {
            let value = match field_type {
                FieldType::Int32 => raw.parse::<i32>().map(FieldValue::Int32).map_err(|_| {
                    CodecError::MalformedCellToken {
                        layer,
                        token: token.to_string(),
                        reason: "field value is not a 32-bit integer",
                    }
                })?,
                FieldType::Unknown(_) => {
                    return Err(CodecError::UnsupportedFieldType {
                        block: self.registry.name_of(id)?.to_string(),
                        field_type: field_type.clone(),
                    });
                }
            };
            data.push(value);
        }

        Ok(Block::with_data(self.registry, id, data)?)
    }
}

/// Splits a cell token into its palette index and the raw field list.
fn parse_token(layer: Layer, token: &str) -> Result<(u32, Option<&str>), CodecError> {
    let malformed = |reason| CodecError::MalformedCellToken {
        layer,
        token: token.to_string(),
        reason,
    };

    let (index, fields) = match token.split_once(FIELD_DELIMITER) {
        Some((index, fields)) => (index, Some(fields)),
        None => (token, None),
    };

    if index.is_empty() {
        return Err(malformed("missing palette index"));
    }
    if !index
        .bytes()
        .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
    {
        return Err(malformed("palette index is not uppercase base 36"));
    }
    if fields == Some("") {
        return Err(malformed("empty field list"));
    }

    let index = u32::from_str_radix(index, 36).map_err(|_| malformed("palette index overflows"))?;
    Ok((index, fields))
}

fn push_base36(out: &mut String, mut value: usize) {
    let mut digits = [0u8; 16];
    let mut len = 0;
    loop {
        digits[len] = BASE36_DIGITS[value % 36];
        len += 1;
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.extend(digits[..len].iter().rev().map(|&digit| char::from(digit)));
}

fn push_field(out: &mut String, value: &FieldValue) {
    use std::fmt::Write as _;
    // Writing to a String cannot fail.
    let _ = write!(out, "{value}");
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};
    use tilegrid_shared::{
        BlockDefinition, BlockId, BlockTable, FieldType, FieldValue, Layer, World, WorldError,
    };

    use super::{parse_token, push_base36, TextCodec, WorldDocument};
    use crate::error::CodecError;

    fn table() -> BlockTable {
        let mut table = BlockTable::new();
        for name in ["border", "stone"] {
            table
                .register(BlockDefinition::new(name))
                .expect("register plain block");
        }
        table
            .register(BlockDefinition::with_fields(
                "sign",
                vec![FieldType::Int32, FieldType::Int32],
            ))
            .expect("register sign");
        table
    }

    fn base36(value: usize) -> String {
        let mut out = String::new();
        push_base36(&mut out, value);
        out
    }

    #[test]
    fn base36_uses_uppercase_digits() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(9), "9");
        assert_eq!(base36(10), "A");
        assert_eq!(base36(35), "Z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(1295), "ZZ");
    }

    #[test]
    fn empty_one_by_one_world_encodes_to_index_zero() {
        let table = table();
        let world = World::new(1, 1).expect("valid dimensions");

        let document = TextCodec::new(&table)
            .encode(&world, Map::new())
            .expect("encode");

        assert_eq!(document.file_version, 0);
        assert_eq!((document.width, document.height), (1, 1));
        assert_eq!(document.palette, vec!["empty".to_string()]);
        assert_eq!(document.layers.foreground, "0 ");
        assert_eq!(document.layers.background, "0 ");
    }

    #[test]
    fn palette_grows_in_first_occurrence_order() {
        let table = table();
        let mut world = World::new(2, 2).expect("valid dimensions");
        let stone = table.get_by_name("stone").expect("registered");
        let sign = table.get_by_name("sign").expect("registered");
        world
            .place(&table, 1, 0, Layer::Background, sign, vec![FieldValue::Int32(4), FieldValue::Int32(-2)])
            .expect("place sign");
        world
            .place(&table, 0, 1, Layer::Foreground, stone, Vec::new())
            .expect("place stone");
        world
            .place(&table, 1, 1, Layer::Foreground, stone, Vec::new())
            .expect("place stone");

        let document = TextCodec::new(&table)
            .encode(&world, Map::new())
            .expect("encode");

        assert_eq!(document.palette, vec!["empty", "sign", "stone"]);
        assert_eq!(document.layers.background, "0 0 1:4,-2 0 ");
        assert_eq!(document.layers.foreground, "0 2 0 2 ");
    }

    #[test]
    fn metadata_is_merged_at_the_top_level() {
        let table = table();
        let world = World::new(1, 1).expect("valid dimensions");
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), json!("Lobby"));
        metadata.insert("author".to_string(), json!({ "id": 7 }));

        let document = TextCodec::new(&table)
            .encode(&world, metadata)
            .expect("encode");
        let value: Value = serde_json::from_str(&document.to_json_string(false).expect("to json"))
            .expect("valid json");

        assert_eq!(value["fileVersion"], json!(0));
        assert_eq!(value["name"], json!("Lobby"));
        assert_eq!(value["author"]["id"], json!(7));
        assert_eq!(value["layers"]["foreground"], json!("0 "));
    }

    #[test]
    fn reserved_metadata_keys_are_rejected() {
        let table = table();
        let world = World::new(1, 1).expect("valid dimensions");
        let mut metadata = Map::new();
        metadata.insert("palette".to_string(), json!([]));

        let err = TextCodec::new(&table)
            .encode(&world, metadata)
            .expect_err("palette is reserved");
        assert!(matches!(err, CodecError::ReservedMetadataKey(key) if key == "palette"));
    }

    #[test]
    fn decode_rebuilds_blocks_and_data() {
        let table = table();
        let src = r#"{
            "fileVersion": 0,
            "width": 2,
            "height": 1,
            "palette": ["empty", "sign", "border"],
            "layers": { "foreground": "2 2 ", "background": "1:12,300 0 " },
            "title": "demo"
        }"#;
        let document = WorldDocument::from_json_str(src).expect("parse document");
        assert_eq!(document.metadata.get("title"), Some(&json!("demo")));

        let world = TextCodec::new(&table).decode(&document).expect("decode");

        let sign = world.block_at(0, 0, Layer::Background).expect("in range");
        assert_eq!(sign.id(), table.get_by_name("sign").expect("registered"));
        assert_eq!(sign.data(), &[FieldValue::Int32(12), FieldValue::Int32(300)]);
        assert!(world.block_at(1, 0, Layer::Background).expect("in range").is_empty());
        let border = table.get_by_name("border").expect("registered");
        assert_eq!(world.block_at(0, 0, Layer::Foreground).expect("in range").id(), border);
        assert_eq!(world.block_at(1, 0, Layer::Foreground).expect("in range").id(), border);
    }

    #[test]
    fn round_trip_preserves_every_cell() {
        let table = table();
        let mut world = World::new(5, 4).expect("valid dimensions");
        world.clear(&table, true).expect("clear");
        world
            .place(&table, 2, 2, Layer::Background, table.get_by_name("sign").expect("registered"), vec![FieldValue::Int32(i32::MIN), FieldValue::Int32(0)])
            .expect("place sign");
        world
            .place(&table, 3, 1, Layer::Foreground, table.get_by_name("stone").expect("registered"), Vec::new())
            .expect("place stone");

        let codec = TextCodec::new(&table);
        let document = codec.encode(&world, Map::new()).expect("encode");
        let mut json = Vec::new();
        document.write_json(&mut json, true).expect("write json");
        let reread = WorldDocument::read_json(json.as_slice()).expect("read json");
        let decoded = codec.decode(&reread).expect("decode");

        for layer in Layer::ALL {
            for ((x, y, expected), (_, _, actual)) in world.cells(layer).zip(decoded.cells(layer)) {
                assert!(actual.is_same_as(expected), "mismatch at ({x}, {y}, {layer})");
            }
        }
    }

    #[test]
    fn token_grammar_is_strict() {
        assert_eq!(parse_token(Layer::Foreground, "Z").expect("valid"), (35, None));
        assert_eq!(
            parse_token(Layer::Foreground, "1A:3,-4").expect("valid"),
            (46, Some("3,-4"))
        );
        for bad in ["", ":1", "1:", "a", "1-2", "ZZZZZZZZZZZZ"] {
            assert!(
                matches!(
                    parse_token(Layer::Background, bad),
                    Err(CodecError::MalformedCellToken { .. })
                ),
                "`{bad}` should be rejected"
            );
        }
    }

    fn document(palette: &[&str], foreground: &str, background: &str) -> WorldDocument {
        WorldDocument {
            file_version: 0,
            width: 2,
            height: 1,
            palette: palette.iter().map(|name| name.to_string()).collect(),
            layers: super::LayerStrings {
                foreground: foreground.to_string(),
                background: background.to_string(),
            },
            metadata: Map::new(),
        }
    }

    #[test]
    fn decode_reports_bad_documents() {
        let table = table();
        let codec = TextCodec::new(&table);

        let err = codec
            .decode(&document(&["empty"], "0 ", "0 0 "))
            .expect_err("foreground is short");
        assert!(matches!(
            err,
            CodecError::CellCountMismatch { layer: Layer::Foreground, expected: 2, actual: 1 }
        ));

        let err = codec
            .decode(&document(&["empty"], "0 3 ", "0 0 "))
            .expect_err("index 3 is past the palette");
        assert!(matches!(err, CodecError::PaletteIndexOutOfRange { index: 3, len: 1 }));

        let err = codec
            .decode(&document(&["empty", "lava"], "0 0 ", "0 0 "))
            .expect_err("lava is not registered");
        assert!(matches!(err, CodecError::World(WorldError::UnknownBlockName(name)) if name == "lava"));

        let err = codec
            .decode(&document(&["empty", "sign"], "1:5 0 ", "0 0 "))
            .expect_err("sign needs two values");
        assert!(matches!(
            err,
            CodecError::World(WorldError::FieldCountMismatch { expected: 2, actual: 1, .. })
        ));

        let err = codec
            .decode(&document(&["empty", "sign"], "1 0 ", "0 0 "))
            .expect_err("sign without values");
        assert!(matches!(
            err,
            CodecError::World(WorldError::FieldCountMismatch { expected: 2, actual: 0, .. })
        ));

        let err = codec
            .decode(&document(&["empty", "sign"], "1:5,x 0 ", "0 0 "))
            .expect_err("x is not a number");
        assert!(matches!(err, CodecError::MalformedCellToken { .. }));

        let mut future = document(&["empty"], "0 0 ", "0 0 ");
        future.file_version = 1;
        assert!(matches!(
            codec.decode(&future),
            Err(CodecError::UnsupportedFileVersion { found: 1, .. })
        ));
    }

    #[test]
    fn oversized_dimensions_are_rejected_before_allocating() {
        let table = table();
        let codec = TextCodec::new(&table);
        let mut huge = document(&["empty"], "0 ", "0 ");
        huge.width = u32::MAX;
        huge.height = u32::MAX;

        let err = codec.decode(&huge).expect_err("one token cannot cover the world");
        assert!(matches!(
            err,
            CodecError::CellCountMismatch { layer: Layer::Background, expected, actual: 1 }
                if expected == u64::from(u32::MAX) * u64::from(u32::MAX)
        ));

        let mut flat = document(&["empty"], "", "");
        flat.width = 0;
        assert!(matches!(
            codec.decode(&flat),
            Err(CodecError::World(WorldError::InvalidDimensions { width: 0, height: 1 }))
        ));
    }

    #[test]
    fn encode_rejects_blocks_that_skipped_schema_checks() {
        let table = table();
        let sign = table.get_by_name("sign").expect("registered");
        let mut world = World::new(1, 1).expect("valid dimensions");
        world
            .set_block(0, 0, Layer::Background, std::sync::Arc::new(tilegrid_shared::Block::new(sign)))
            .expect("in range");

        let err = TextCodec::new(&table)
            .encode(&world, Map::new())
            .expect_err("sign without values would not decode");
        assert!(matches!(
            err,
            CodecError::World(WorldError::FieldCountMismatch { expected: 2, actual: 0, .. })
        ));
    }

    #[test]
    fn unregistered_ids_cannot_be_encoded() {
        let table = table();
        let mut world = World::new(1, 1).expect("valid dimensions");
        world
            .set_block(0, 0, Layer::Foreground, std::sync::Arc::new(tilegrid_shared::Block::new(BlockId(77))))
            .expect("in range");

        let err = TextCodec::new(&table)
            .encode(&world, Map::new())
            .expect_err("id 77 has no name");
        assert!(matches!(err, CodecError::World(WorldError::UnknownBlockId(BlockId(77)))));
    }
}
