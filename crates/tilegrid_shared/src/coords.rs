use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two parallel grids of a world.
///
/// The discriminants match the on-disk layer numbering: background is
/// layer 0 and is always stored first.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Background = 0,
    Foreground = 1,
}

impl Layer {
    /// Storage order shared by both codecs.
    pub const ALL: [Layer; 2] = [Layer::Background, Layer::Foreground];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Layer::Background => "background",
            Layer::Foreground => "foreground",
        }
    }
}

impl TryFrom<u8> for Layer {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Layer::Background),
            1 => Ok(Layer::Foreground),
            other => Err(other),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Address of a single cell: column, row and layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPosition {
    pub x: u32,
    pub y: u32,
    pub layer: Layer,
}

impl WorldPosition {
    pub const fn new(x: u32, y: u32, layer: Layer) -> Self {
        Self { x, y, layer }
    }
}

/// Cells are stored column-major: every row of column 0, then column 1.
/// This is the same order both codecs walk a layer in.
pub fn cell_index(x: u32, y: u32, height: u32) -> usize {
    x as usize * height as usize + y as usize
}

pub fn index_to_cell(index: usize, height: u32) -> (u32, u32) {
    assert!(height > 0, "world height must be positive");

    let height = height as usize;
    ((index / height) as u32, (index % height) as u32)
}

pub fn is_edge_cell(x: u32, y: u32, width: u32, height: u32) -> bool {
    x == 0 || y == 0 || x + 1 >= width || y + 1 >= height
}
