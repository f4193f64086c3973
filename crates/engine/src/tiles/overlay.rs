use crate::content::MoveMode;

use super::animation::TimeMs;
use super::coords::{Ivec2, Rcoord, TileSize};
use super::entity::{facing_phase, moving_phase, Entity, EntityId};

/// A free-floating entity drawn above the grid. It ignores walk flags,
/// occupancy and triggers.
#[derive(Debug)]
pub struct Overlay {
    entity: Entity,
}

impl Overlay {
    pub fn new(entity: Entity, at: Rcoord) -> Self {
        let mut entity = entity;
        entity.set_pixel(at);
        Self { entity }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    pub fn move_by_tile(&mut self, delta: Ivec2, tile: TileSize, mode: MoveMode, now: TimeMs) -> bool {
        if self.entity.is_moving() || self.entity.is_frozen() || !delta.is_unit_cardinal() {
            return false;
        }
        self.entity.set_facing(delta);
        let from = self.entity.pixel();
        let dest = Rcoord::new(
            from.x + (delta.x * tile.width as i32) as f32,
            from.y + (delta.y * tile.height as i32) as f32,
            from.z,
        );
        match mode {
            MoveMode::Turn => self.entity.set_pixel(dest),
            MoveMode::Tile | MoveMode::Notile => self.drift_to(dest, now),
        }
        true
    }

    /// Starts a straight-line glide to `dest` at the overlay's speed.
    pub fn drift_to(&mut self, dest: Rcoord, now: TimeMs) {
        self.entity
            .set_phase(moving_phase(self.entity.facing()), now);
        self.entity.begin_move(dest);
    }

    pub fn tick(&mut self, dt_seconds: f32, tile: TileSize, now: TimeMs) {
        if self.entity.advance(dt_seconds, tile.width).is_some() {
            self.entity
                .set_phase(facing_phase(self.entity.facing()), now);
        }
    }
}
