mod animation;
mod area;
mod character;
mod coords;
mod entity;
mod grid;
mod overlay;
mod player;
mod tileset;
mod world;

pub use animation::{Animation, TimeMs};
pub use area::{Area, AreaHooks, AreaProperties, PlacementError};
pub use character::{Character, CharacterKind, MoveContext};
pub use coords::{
    phys2pixel, phys2virt, pixel2phys, pixel2virt, virt2phys, virt2pixel, DepthTable,
    DuplicateDepth, Icoord, Icube, Ivec2, PixelRect, Rcoord, TileSize, Vicoord,
};
pub use entity::{
    facing_phase, moving_phase, Entity, EntityHooks, EntityId, EntityIdAllocator, EntitySprite,
    MoveState, PLAYER_ID, STANCE_PHASE,
};
pub use grid::{Exit, ExitDir, LayerKind, TileFlags, TileGrid, TriggerKind};
pub use overlay::Overlay;
pub use player::Player;
pub use tileset::{TileSet, TileType, TileTypeIndex, TileTypes, EMPTY_TILE_TYPE};
pub use world::{World, WorldError};

#[cfg(test)]
pub(crate) use world::test_support as world_support;
