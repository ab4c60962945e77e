use std::sync::Arc;

use tracing::debug;

use crate::block::{Block, BlockId, FieldValue};
use crate::coords::{cell_index, index_to_cell, is_edge_cell, Layer, WorldPosition};
use crate::error::WorldError;
use crate::registry::BlockRegistry;

/// Two same-size grids of blocks: background (layer 0) and foreground
/// (layer 1).
///
/// Cells hold `Arc<Block>`. `copy` and `paste` move those handles around
/// rather than cloning blocks, so two worlds can share instances. Blocks
/// are immutable, which keeps the sharing unobservable; clone explicitly
/// if a caller ever needs an independent instance.
#[derive(Clone, Debug)]
pub struct World {
    width: u32,
    height: u32,
    background: Vec<Arc<Block>>,
    foreground: Vec<Arc<Block>>,
}

impl World {
    pub fn new(width: u32, height: u32) -> Result<Self, WorldError> {
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidDimensions { width, height });
        }

        let cells = (width as usize)
            .checked_mul(height as usize)
            .ok_or(WorldError::InvalidDimensions { width, height })?;
        let empty = Arc::new(Block::EMPTY);
        Ok(Self {
            width,
            height,
            background: vec![Arc::clone(&empty); cells],
            foreground: vec![empty; cells],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Cells per layer.
    pub fn cell_count(&self) -> usize {
        self.background.len()
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Resets every cell. With `border` set, the outer ring of the
    /// foreground gets the registry's border block.
    pub fn clear<R>(&mut self, registry: &R, border: bool) -> Result<(), WorldError>
    where
        R: BlockRegistry + ?Sized,
    {
        let edge = if border {
            Some(Arc::new(Block::from_name(
                registry,
                registry.border_block_name(),
            )?))
        } else {
            None
        };
        let empty = Arc::new(Block::EMPTY);

        for (index, cell) in self.foreground.iter_mut().enumerate() {
            let (x, y) = index_to_cell(index, self.height);
            *cell = match &edge {
                Some(edge) if is_edge_cell(x, y, self.width, self.height) => Arc::clone(edge),
                _ => Arc::clone(&empty),
            };
        }
        self.background.fill(empty);

        Ok(())
    }

    /// Builds a block from `id` and `data`, checking `data` against the
    /// registry schema, and stores it at `(x, y, layer)`.
    pub fn place<R>(
        &mut self,
        registry: &R,
        x: u32,
        y: u32,
        layer: Layer,
        id: BlockId,
        data: Vec<FieldValue>,
    ) -> Result<(WorldPosition, Arc<Block>), WorldError>
    where
        R: BlockRegistry + ?Sized,
    {
        self.check_bounds(u64::from(x), u64::from(y))?;
        let block = Arc::new(Block::with_data(registry, id, data)?);
        self.set_block(x, y, layer, Arc::clone(&block))?;
        Ok((WorldPosition::new(x, y, layer), block))
    }

    pub fn block_at(&self, x: u32, y: u32, layer: Layer) -> Result<&Arc<Block>, WorldError> {
        self.check_bounds(u64::from(x), u64::from(y))?;
        Ok(&self.layer(layer)[cell_index(x, y, self.height)])
    }

    /// Replaces one cell with an already built block. No schema check.
    pub fn set_block(
        &mut self,
        x: u32,
        y: u32,
        layer: Layer,
        block: Arc<Block>,
    ) -> Result<(), WorldError> {
        self.check_bounds(u64::from(x), u64::from(y))?;
        let index = cell_index(x, y, self.height);
        self.layer_mut(layer)[index] = block;
        Ok(())
    }

    /// Extracts the inclusive rectangle spanned by two corners. The result
    /// shares its blocks with `self`.
    pub fn copy(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> Result<World, WorldError> {
        self.check_bounds(u64::from(x1), u64::from(y1))?;
        self.check_bounds(u64::from(x2), u64::from(y2))?;

        let (min_x, max_x) = (x1.min(x2), x1.max(x2));
        let (min_y, max_y) = (y1.min(y2), y1.max(y2));

        let mut region = World::new(max_x - min_x + 1, max_y - min_y + 1)?;
        for layer in Layer::ALL {
            let source = self.layer(layer);
            let target = region.layer_mut(layer);
            let mut index = 0;
            for x in min_x..=max_x {
                for y in min_y..=max_y {
                    target[index] = Arc::clone(&source[cell_index(x, y, self.height)]);
                    index += 1;
                }
            }
        }

        debug!(
            "Copied {}x{} region at ({}, {})",
            region.width, region.height, min_x, min_y
        );
        Ok(region)
    }

    /// Writes every cell of `source` into `self`, shifted by the offsets.
    /// The whole target rectangle is bounds-checked before anything is
    /// written, so a failed paste leaves `self` untouched.
    pub fn paste(&mut self, x_offset: u32, y_offset: u32, source: &World) -> Result<(), WorldError> {
        let far_x = u64::from(x_offset) + u64::from(source.width) - 1;
        let far_y = u64::from(y_offset) + u64::from(source.height) - 1;
        self.check_bounds(far_x, far_y)?;

        for layer in Layer::ALL {
            let height = self.height;
            let from = source.layer(layer);
            let target = self.layer_mut(layer);
            for (index, block) in from.iter().enumerate() {
                let (x, y) = index_to_cell(index, source.height);
                target[cell_index(x + x_offset, y + y_offset, height)] = Arc::clone(block);
            }
        }

        Ok(())
    }

    pub fn layer(&self, layer: Layer) -> &[Arc<Block>] {
        match layer {
            Layer::Background => &self.background,
            Layer::Foreground => &self.foreground,
        }
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut [Arc<Block>] {
        match layer {
            Layer::Background => &mut self.background,
            Layer::Foreground => &mut self.foreground,
        }
    }

    /// Cells of one layer in storage order (x outer, y inner).
    pub fn cells(&self, layer: Layer) -> impl Iterator<Item = (u32, u32, &Arc<Block>)> + '_ {
        let height = self.height;
        self.layer(layer).iter().enumerate().map(move |(index, block)| {
            let (x, y) = index_to_cell(index, height);
            (x, y, block)
        })
    }

    fn check_bounds(&self, x: u64, y: u64) -> Result<(), WorldError> {
        if x < u64::from(self.width) && y < u64::from(self.height) {
            Ok(())
        } else {
            Err(WorldError::OutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }
}
