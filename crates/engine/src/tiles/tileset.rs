use crate::backend::{ScriptRef, TiledImageHandle};

use super::animation::Animation;
use super::coords::TileSize;
use super::grid::{TileFlags, TriggerKind};

/// Index into an area's tile-type table. `0` is the reserved empty type.
pub type TileTypeIndex = u32;

pub const EMPTY_TILE_TYPE: TileTypeIndex = 0;

/// Look and behavior shared by every cell painted with this type.
#[derive(Debug, Clone, Default)]
pub struct TileType {
    pub flags: TileFlags,
    pub animation: Option<Animation>,
    hooks: [Vec<ScriptRef>; TriggerKind::COUNT],
}

impl TileType {
    pub fn new(flags: TileFlags, animation: Option<Animation>) -> Self {
        Self {
            flags,
            animation,
            hooks: Default::default(),
        }
    }

    pub fn hooks(&self, trigger: TriggerKind) -> &[ScriptRef] {
        &self.hooks[trigger.index()]
    }

    pub fn add_hook(&mut self, trigger: TriggerKind, script: ScriptRef) {
        self.hooks[trigger.index()].push(script);
    }
}

/// One tileset image, contributing `across * high` consecutive gids.
#[derive(Debug, Clone)]
pub struct TileSet {
    pub image: String,
    pub sheet: TiledImageHandle,
    pub first_gid: TileTypeIndex,
    pub tile_size: TileSize,
    pub across: u32,
    pub high: u32,
}

impl TileSet {
    pub fn tile_count(&self) -> u32 {
        self.across * self.high
    }

    pub fn contains(&self, gid: TileTypeIndex) -> bool {
        gid >= self.first_gid && gid - self.first_gid < self.tile_count()
    }

    pub fn local_id(&self, gid: TileTypeIndex) -> Option<u32> {
        self.contains(gid).then(|| gid - self.first_gid)
    }

    pub fn gid(&self, local_id: u32) -> TileTypeIndex {
        self.first_gid + local_id
    }
}

/// Per-area tile-type table, indexed by gid.
#[derive(Debug, Clone)]
pub struct TileTypes {
    types: Vec<TileType>,
}

impl Default for TileTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl TileTypes {
    pub fn new() -> Self {
        Self {
            types: vec![TileType::default()],
        }
    }

    pub fn push(&mut self, tile_type: TileType) -> TileTypeIndex {
        self.types.push(tile_type);
        (self.types.len() - 1) as TileTypeIndex
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.len() <= 1
    }

    /// The gid the next pushed type will receive.
    pub fn next_gid(&self) -> TileTypeIndex {
        self.types.len() as TileTypeIndex
    }

    pub fn get(&self, index: TileTypeIndex) -> Option<&TileType> {
        self.types.get(index as usize)
    }

    pub fn flags(&self, index: TileTypeIndex) -> TileFlags {
        self.get(index).map(|t| t.flags).unwrap_or_default()
    }

    pub fn animation(&self, index: TileTypeIndex) -> Option<&Animation> {
        if index == EMPTY_TILE_TYPE {
            return None;
        }
        self.get(index).and_then(|t| t.animation.as_ref())
    }

    pub fn hooks(&self, index: TileTypeIndex, trigger: TriggerKind) -> &[ScriptRef] {
        self.get(index).map(|t| t.hooks(trigger)).unwrap_or(&[])
    }
}
