//! Physical, virtual and pixel coordinates of an area, and the conversions
//! between them.
//!
//! Physical coordinates index the dense tile grid (`z` is a layer index).
//! Virtual coordinates share `x`/`y` with physical ones but carry the layer's
//! designer-assigned depth in `z`. Pixel coordinates scale `x`/`y` by the tile
//! size and also carry the depth.

use std::collections::HashMap;
use std::ops::Add;

use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Icoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Icoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl Add<Ivec2> for Icoord {
    type Output = Icoord;

    fn add(self, rhs: Ivec2) -> Icoord {
        Icoord {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vicoord {
    pub x: i32,
    pub y: i32,
    pub z: f32,
}

impl Vicoord {
    pub const fn new(x: i32, y: i32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rcoord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Rcoord {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_xy(&self, other: Rcoord) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Facing or step vector. Pixel `y` grows downward, so "up" is `(0, -1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ivec2 {
    pub x: i32,
    pub y: i32,
}

impl Ivec2 {
    pub const ZERO: Ivec2 = Ivec2 { x: 0, y: 0 };
    pub const UP: Ivec2 = Ivec2 { x: 0, y: -1 };
    pub const DOWN: Ivec2 = Ivec2 { x: 0, y: 1 };
    pub const LEFT: Ivec2 = Ivec2 { x: -1, y: 0 };
    pub const RIGHT: Ivec2 = Ivec2 { x: 1, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_unit_cardinal(&self) -> bool {
        self.x.abs() + self.y.abs() == 1
    }
}

/// Half-open box of physical coordinates: `x1 <= x < x2`, and so on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Icube {
    pub x1: i32,
    pub y1: i32,
    pub z1: i32,
    pub x2: i32,
    pub y2: i32,
    pub z2: i32,
}

impl Icube {
    pub fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2 || self.z1 >= self.z2
    }

    pub fn contains(&self, c: Icoord) -> bool {
        (self.x1..self.x2).contains(&c.x)
            && (self.y1..self.y2).contains(&c.y)
            && (self.z1..self.z2).contains(&c.z)
    }
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Pixel size of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("depth {depth} is already assigned to layer {existing_layer}")]
pub struct DuplicateDepth {
    pub depth: f32,
    pub existing_layer: i32,
}

/// Hash key for a depth. `-0.0` and `0.0` name the same layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DepthKey(u32);

impl DepthKey {
    fn of(depth: f32) -> Self {
        let normalized = if depth == 0.0 { 0.0f32 } else { depth };
        Self(normalized.to_bits())
    }
}

/// Bireversible mapping between layer indices and layer depths.
#[derive(Debug, Clone, Default)]
pub struct DepthTable {
    idx2depth: Vec<f32>,
    depth2idx: HashMap<DepthKey, i32>,
}

impl DepthTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_depths(depths: &[f32]) -> Result<Self, DuplicateDepth> {
        let mut table = Self::new();
        for &depth in depths {
            table.push_layer(depth)?;
        }
        Ok(table)
    }

    /// Registers the next layer index under `depth`.
    pub fn push_layer(&mut self, depth: f32) -> Result<i32, DuplicateDepth> {
        let key = DepthKey::of(depth);
        if let Some(&existing_layer) = self.depth2idx.get(&key) {
            return Err(DuplicateDepth {
                depth,
                existing_layer,
            });
        }
        let index = self.idx2depth.len() as i32;
        self.idx2depth.push(depth);
        self.depth2idx.insert(key, index);
        Ok(index)
    }

    pub fn layer_count(&self) -> i32 {
        self.idx2depth.len() as i32
    }

    pub fn depth_of(&self, layer: i32) -> Option<f32> {
        usize::try_from(layer)
            .ok()
            .and_then(|idx| self.idx2depth.get(idx).copied())
    }

    pub fn layer_of(&self, depth: f32) -> Option<i32> {
        self.depth2idx.get(&DepthKey::of(depth)).copied()
    }

    /// Panics if `layer` is not a registered layer index.
    pub fn depth(&self, layer: i32) -> f32 {
        match self.depth_of(layer) {
            Some(depth) => depth,
            None => panic!(
                "layer index {layer} outside [0, {})",
                self.idx2depth.len()
            ),
        }
    }

    /// Panics if `depth` was never registered.
    pub fn layer(&self, depth: f32) -> i32 {
        match self.layer_of(depth) {
            Some(layer) => layer,
            None => panic!("depth {depth} is not registered with any layer"),
        }
    }

    pub fn depths(&self) -> &[f32] {
        &self.idx2depth
    }
}

pub fn phys2virt(phys: Icoord, depths: &DepthTable) -> Vicoord {
    Vicoord {
        x: phys.x,
        y: phys.y,
        z: depths.depth(phys.z),
    }
}

pub fn virt2phys(virt: Vicoord, depths: &DepthTable) -> Icoord {
    Icoord {
        x: virt.x,
        y: virt.y,
        z: depths.layer(virt.z),
    }
}

pub fn phys2pixel(phys: Icoord, tile: TileSize, depths: &DepthTable) -> Rcoord {
    Rcoord {
        x: (phys.x * tile.width as i32) as f32,
        y: (phys.y * tile.height as i32) as f32,
        z: depths.depth(phys.z),
    }
}

// Pixel-to-tile division truncates toward zero rather than flooring. Worlds
// that scroll left of or above the origin on a looping axis rely on it.
pub fn pixel2phys(pixel: Rcoord, tile: TileSize, depths: &DepthTable) -> Icoord {
    Icoord {
        x: (pixel.x / tile.width as f32) as i32,
        y: (pixel.y / tile.height as f32) as i32,
        z: depths.layer(pixel.z),
    }
}

pub fn virt2pixel(virt: Vicoord, tile: TileSize) -> Rcoord {
    Rcoord {
        x: (virt.x * tile.width as i32) as f32,
        y: (virt.y * tile.height as i32) as f32,
        z: virt.z,
    }
}

pub fn pixel2virt(pixel: Rcoord, tile: TileSize) -> Vicoord {
    Vicoord {
        x: (pixel.x / tile.width as f32) as i32,
        y: (pixel.y / tile.height as f32) as i32,
        z: pixel.z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DepthTable {
        DepthTable::from_depths(&[-1.0, 0.0, 0.5, 2.25]).expect("depths")
    }

    #[test]
    fn virt_and_phys_round_trip_on_registered_depths() {
        let depths = table();
        for &depth in depths.depths() {
            for x in 0..4 {
                for y in 0..3 {
                    let virt = Vicoord::new(x, y, depth);
                    let phys = virt2phys(virt, &depths);
                    assert_eq!(virt2phys(phys2virt(phys, &depths), &depths), phys);
                    assert_eq!(phys2virt(phys, &depths), virt);
                }
            }
        }
    }

    #[test]
    fn duplicate_depth_is_rejected_with_existing_layer() {
        let err = DepthTable::from_depths(&[0.0, 1.0, 1.0]).expect_err("duplicate");
        assert_eq!(err.existing_layer, 1);
    }

    #[test]
    fn negative_zero_and_zero_are_the_same_depth() {
        let mut depths = DepthTable::new();
        depths.push_layer(0.0).expect("first");
        assert!(depths.push_layer(-0.0).is_err());
        assert_eq!(depths.layer_of(-0.0), Some(0));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn converting_unknown_depth_fails_fast() {
        let depths = table();
        let _ = virt2phys(Vicoord::new(0, 0, 7.0), &depths);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn converting_unknown_layer_fails_fast() {
        let depths = table();
        let _ = phys2virt(Icoord::new(0, 0, 4), &depths);
    }

    #[test]
    fn pixel_conversions_scale_by_tile_size() {
        let depths = table();
        let tile = TileSize::new(16, 16);
        let pixel = phys2pixel(Icoord::new(3, 2, 2), tile, &depths);
        assert_eq!(pixel, Rcoord::new(48.0, 32.0, 0.5));
        assert_eq!(pixel2phys(Rcoord::new(63.9, 47.0, 0.5), tile, &depths), Icoord::new(3, 2, 2));
        assert_eq!(virt2pixel(Vicoord::new(1, 4, 2.25), tile), Rcoord::new(16.0, 64.0, 2.25));
        assert_eq!(pixel2virt(Rcoord::new(17.0, 64.0, 2.25), tile), Vicoord::new(1, 4, 2.25));
    }

    #[test]
    fn pixel_to_tile_division_truncates_toward_zero() {
        let depths = table();
        let tile = TileSize::new(16, 16);
        let phys = pixel2phys(Rcoord::new(-8.0, -17.0, 0.0), tile, &depths);
        assert_eq!(phys, Icoord::new(0, -1, 1));
        let virt = pixel2virt(Rcoord::new(-15.9, 8.0, 0.0), tile);
        assert_eq!(virt.x, 0);
    }

    #[test]
    fn cardinal_detection() {
        assert!(Ivec2::UP.is_unit_cardinal());
        assert!(Ivec2::RIGHT.is_unit_cardinal());
        assert!(!Ivec2::ZERO.is_unit_cardinal());
        assert!(!Ivec2::new(1, 1).is_unit_cardinal());
        assert!(!Ivec2::new(2, 0).is_unit_cardinal());
    }
}
