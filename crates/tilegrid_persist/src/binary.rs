//! Flat little-endian cell records.
//!
//! A buffer holds every background cell, then every foreground cell, each
//! layer walked column by column (x outer, y inner). A cell record is an
//! `i32` block id followed by one value per field in the block's schema.
//! Id 0 never has fields. There is no header: the caller supplies the
//! world dimensions.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::sync::Arc;

use indexmap::IndexMap;
use tilegrid_shared::coords::index_to_cell;
use tilegrid_shared::{
    Block, BlockId, BlockRegistry, FieldType, FieldValue, Layer, World, WorldError, WorldPosition,
};
use tracing::{debug, warn};

use crate::error::CodecError;

/// Non-fatal findings of a binary decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeWarning {
    /// The input ended early or had bytes left over. Usually means the data
    /// was written against a different registry or schema version.
    BufferLengthMismatch { consumed: u64, available: u64 },
    /// Cells referenced an id the registry does not know. They were kept as
    /// field-less blocks. One warning per id, in order of first sighting.
    UnknownBlockId {
        id: BlockId,
        count: usize,
        first: WorldPosition,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub consumed: u64,
    pub cells_decoded: usize,
    pub warnings: Vec<DecodeWarning>,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn length_mismatch(&self) -> Option<&DecodeWarning> {
        self.warnings
            .iter()
            .find(|warning| matches!(warning, DecodeWarning::BufferLengthMismatch { .. }))
    }
}

struct CellReader<R> {
    inner: R,
    consumed: u64,
}

impl<R: Read> CellReader<R> {
    /// `None` when the input runs out before a whole word is read. Partial
    /// bytes still count as consumed.
    fn read_word(&mut self) -> io::Result<Option<[u8; 4]>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        self.consumed += filled as u64;
        Ok((filled == buf.len()).then_some(buf))
    }

    fn drain(&mut self) -> io::Result<u64> {
        io::copy(&mut self.inner, &mut io::sink())
    }
}

pub struct BinaryCodec<'r, R: ?Sized> {
    registry: &'r R,
}

impl<'r, R> BinaryCodec<'r, R>
where
    R: BlockRegistry + ?Sized,
{
    pub fn new(registry: &'r R) -> Self {
        Self { registry }
    }

    /// Decodes `bytes` into a fresh `width` x `height` world.
    pub fn decode(
        &self,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Result<(World, DecodeReport), CodecError> {
        let mut world = World::new(width, height)?;
        let report = self.decode_cells(&mut world, bytes)?;
        Ok((world, report))
    }

    /// Overwrites the cells of a pre-sized world from `source`. If the
    /// input is short, cells past the point where it ran out keep their
    /// previous contents. On error `world` is left as it was.
    pub fn decode_into<S: Read>(&self, world: &mut World, source: S) -> Result<DecodeReport, CodecError> {
        let mut scratch = world.clone();
        let report = self.decode_cells(&mut scratch, source)?;
        *world = scratch;
        Ok(report)
    }

    fn decode_cells<S: Read>(&self, world: &mut World, source: S) -> Result<DecodeReport, CodecError> {
        let mut reader = CellReader {
            inner: BufReader::new(source),
            consumed: 0,
        };
        let mut report = DecodeReport::default();
        let mut unknown: IndexMap<BlockId, (usize, WorldPosition)> = IndexMap::new();
        let mut truncated = false;

        'layers: for layer in Layer::ALL {
            for index in 0..world.cell_count() {
                let (x, y) = index_to_cell(index, world.height());
                let Some(word) = reader.read_word()? else {
                    truncated = true;
                    break 'layers;
                };

                let raw = i32::from_le_bytes(word);
                let id = u32::try_from(raw).map(BlockId).map_err(|_| CodecError::NegativeBlockId {
                    raw,
                    offset: reader.consumed - 4,
                })?;

                let schema: &[FieldType] = match self.registry.schema_for_id(id) {
                    Ok(schema) => schema,
                    Err(WorldError::UnknownBlockId(_)) => {
                        unknown
                            .entry(id)
                            .or_insert((0, WorldPosition::new(x, y, layer)))
                            .0 += 1;
                        &[]
                    }
                    Err(err) => return Err(err.into()),
                };

                let mut data = Vec::with_capacity(schema.len());
                for field_type in schema {
                    let value = match field_type {
                        FieldType::Int32 => reader
                            .read_word()?
                            .map(|word| FieldValue::Int32(i32::from_le_bytes(word))),
                        // Its width is unknown, so nothing after it can be
                        // located reliably.
                        FieldType::Unknown(_) => {
                            return Err(CodecError::UnsupportedFieldType {
                                block: self.registry.name_of(id)?.to_string(),
                                field_type: field_type.clone(),
                            });
                        }
                    };
                    let Some(value) = value else {
                        truncated = true;
                        break 'layers;
                    };
                    data.push(value);
                }

                let block = if data.is_empty() {
                    Block::new(id)
                } else {
                    Block::with_data(self.registry, id, data)?
                };
                world.set_block(x, y, layer, Arc::new(block))?;
                report.cells_decoded += 1;
            }
        }

        for (id, (count, first)) in unknown {
            warn!(
                "Kept {} cells of unknown block id {} (first at {}, {} in {})",
                count, id, first.x, first.y, first.layer
            );
            report
                .warnings
                .push(DecodeWarning::UnknownBlockId { id, count, first });
        }

        let trailing = if truncated { 0 } else { reader.drain()? };
        report.consumed = reader.consumed;
        let available = reader.consumed + trailing;

        if truncated || trailing > 0 {
            warn!(
                "Binary world length mismatch: consumed {} of {} bytes ({} of {} cells); the data may come from a different block registry version",
                report.consumed,
                available,
                report.cells_decoded,
                world.cell_count() * Layer::ALL.len(),
            );
            report.warnings.push(DecodeWarning::BufferLengthMismatch {
                consumed: report.consumed,
                available,
            });
        }

        debug!(
            "Decoded {}x{} world from {} bytes ({} warnings)",
            world.width(),
            world.height(),
            report.consumed,
            report.warnings.len()
        );
        Ok(report)
    }

    pub fn encode(&self, world: &World) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::with_capacity(world.cell_count() * Layer::ALL.len() * 4);
        self.write_cells(world, &mut bytes)?;
        Ok(bytes)
    }

    /// Streams the binary form of `world` into `sink`, returning the number
    /// of bytes written.
    pub fn encode_to<W: Write>(&self, world: &World, sink: W) -> Result<u64, CodecError> {
        let mut writer = BufWriter::new(sink);
        let written = self.write_cells(world, &mut writer)?;
        writer.flush()?;
        Ok(written)
    }

    fn write_cells<W: Write>(&self, world: &World, out: &mut W) -> Result<u64, CodecError> {
        let mut written = 0u64;
        for layer in Layer::ALL {
            for (_, _, block) in world.cells(layer) {
                written += self.write_block(block, out)?;
            }
        }
        Ok(written)
    }

    fn write_block<W: Write>(&self, block: &Block, out: &mut W) -> Result<u64, CodecError> {
        let raw = i32::try_from(block.id().0).map_err(|_| CodecError::BlockIdTooLarge(block.id()))?;
        out.write_all(&raw.to_le_bytes())?;
        let mut written = 4u64;

        let schema = self.registry.schema_for_id(block.id())?;
        if schema.len() != block.data().len() {
            return Err(WorldError::FieldCountMismatch {
                name: block.name(self.registry)?.to_string(),
                expected: schema.len(),
                actual: block.data().len(),
            }
            .into());
        }

        for (index, (field_type, value)) in schema.iter().zip(block.data()).enumerate() {
            match (field_type, value) {
                (FieldType::Int32, FieldValue::Int32(value)) => {
                    out.write_all(&value.to_le_bytes())?;
                    written += 4;
                }
                (FieldType::Unknown(_), _) => {
                    return Err(CodecError::UnsupportedFieldType {
                        block: block.name(self.registry)?.to_string(),
                        field_type: field_type.clone(),
                    });
                }
                (expected, value) => {
                    return Err(WorldError::FieldTypeMismatch {
                        name: block.name(self.registry)?.to_string(),
                        index,
                        expected: expected.clone(),
                        actual: value.field_type(),
                    }
                    .into());
                }
            }
        }

        Ok(written)
    }
}
