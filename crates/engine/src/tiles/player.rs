use crate::content::MoveMode;

use super::character::{Character, CharacterKind, MoveContext};
use super::coords::{Icoord, Ivec2};
use super::entity::{Entity, PLAYER_ID};
use super::grid::TriggerKind;
use super::EntitySprite;

const MAX_HELD_KEYS: usize = 4;

/// The keyboard-driven character. Remembers held direction keys so that
/// releasing one resumes the previous one.
#[derive(Debug)]
pub struct Player {
    character: Character,
    held: Vec<Ivec2>,
}

impl Player {
    pub fn new(descriptor: &str, sprite: &EntitySprite) -> Self {
        Self {
            character: Character::new(Entity::new(PLAYER_ID, descriptor, sprite), CharacterKind::Player),
            held: Vec::with_capacity(MAX_HELD_KEYS),
        }
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn character_mut(&mut self) -> &mut Character {
        &mut self.character
    }

    pub fn held(&self) -> &[Ivec2] {
        &self.held
    }

    /// Direction key pressed. The newest key wins.
    pub fn start_movement(&mut self, dir: Ivec2, ctx: &mut MoveContext<'_>) -> bool {
        if !dir.is_unit_cardinal() {
            return false;
        }
        self.held.retain(|held| *held != dir);
        if self.held.len() == MAX_HELD_KEYS {
            self.held.remove(0);
        }
        self.held.push(dir);

        match ctx.mode {
            MoveMode::Turn => self.character.move_by_tile(dir, ctx),
            MoveMode::Tile | MoveMode::Notile => {
                !self.character.entity().is_moving() && self.character.move_by_tile(dir, ctx)
            }
        }
    }

    /// Direction key released. Movement resumes in the next held direction
    /// on the following tick, or stops when none remain.
    pub fn stop_movement(&mut self, dir: Ivec2) {
        self.held.retain(|held| *held != dir);
    }

    pub fn clear_held(&mut self) {
        self.held.clear();
    }

    /// Fires the use trigger of the faced tile. Returns that tile so the
    /// caller can also notify whoever stands there.
    pub fn use_tile(&mut self, ctx: &mut MoveContext<'_>) -> Option<Icoord> {
        if self.character.entity().is_moving() || !self.character.is_on_grid() {
            return None;
        }
        let target = ctx.grid.wrap(self.character.tile() + self.character.entity().facing());
        if !ctx.grid.in_bounds(target) {
            return None;
        }
        ctx.run_trigger(target, TriggerKind::Use, PLAYER_ID);
        Some(target)
    }

    /// Advances movement. Travel left over after reaching a tile carries into
    /// the next step when a direction is still held.
    pub fn tick(&mut self, dt_seconds: f32, ctx: &mut MoveContext<'_>) {
        if ctx.mode == MoveMode::Turn {
            return;
        }
        if self.character.entity().is_moving() {
            let Some(leftover) = self.character.tick(dt_seconds, ctx) else {
                return;
            };
            if ctx.exit_taken.is_some() {
                return;
            }
            if let Some(&dir) = self.held.last() {
                if self.character.move_by_tile(dir, ctx) && leftover > 0.0 {
                    self.tick(leftover, ctx);
                }
            }
            return;
        }

        if let Some(&dir) = self.held.last() {
            if self.character.move_by_tile(dir, ctx) {
                self.tick(dt_seconds, ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordingScripts, ScriptRef};
    use crate::tiles::character::test_support::{grid, Harness};
    use crate::tiles::coords::Rcoord;
    use crate::tiles::entity::test_support::sprite;
    use crate::tiles::grid::TileFlags;

    fn placed(h: &mut Harness, at: Icoord) -> Player {
        let mut p = Player::new("player.json", &sprite(4.0));
        p.character_mut().place(&mut h.grid, at, 0);
        p
    }

    #[test]
    fn held_key_rolls_leftover_travel_into_next_step() {
        let mut h = Harness::new(grid(8, 1));
        let mut p = placed(&mut h, Icoord::new(0, 0, 0));
        let mut ctx = h.ctx(MoveMode::Tile, 0);

        assert!(p.start_movement(Ivec2::RIGHT, &mut ctx));
        // 64 px/s: 0.375s covers one and a half tiles
        p.tick(0.375, &mut ctx);
        assert_eq!(p.character().tile(), Icoord::new(2, 0, 0));
        assert!((p.character().entity().pixel().x - 24.0).abs() < 0.001);
        assert!(p.character().entity().is_moving());
    }

    #[test]
    fn releasing_last_key_stops_at_next_tile() {
        let mut h = Harness::new(grid(8, 1));
        let mut p = placed(&mut h, Icoord::new(0, 0, 0));
        let mut ctx = h.ctx(MoveMode::Tile, 0);

        p.start_movement(Ivec2::RIGHT, &mut ctx);
        p.stop_movement(Ivec2::RIGHT);
        p.tick(1.0, &mut ctx);
        assert_eq!(p.character().tile(), Icoord::new(1, 0, 0));
        assert_eq!(p.character().entity().pixel(), Rcoord::new(16.0, 0.0, 0.0));
        assert!(!p.character().entity().is_moving());
    }

    #[test]
    fn releasing_newest_key_resumes_previous_direction() {
        let mut h = Harness::new(grid(4, 4));
        let mut p = placed(&mut h, Icoord::new(1, 1, 0));
        let mut ctx = h.ctx(MoveMode::Tile, 0);

        p.start_movement(Ivec2::RIGHT, &mut ctx);
        p.start_movement(Ivec2::DOWN, &mut ctx);
        assert_eq!(p.held(), &[Ivec2::RIGHT, Ivec2::DOWN]);
        p.stop_movement(Ivec2::DOWN);
        p.tick(0.25, &mut ctx);
        assert_eq!(p.character().tile(), Icoord::new(3, 1, 0));
        assert!(p.character().entity().is_moving());
        p.stop_movement(Ivec2::RIGHT);
        p.tick(0.25, &mut ctx);
        assert_eq!(p.character().entity().pixel(), Rcoord::new(48.0, 16.0, 0.0));
        assert!(!p.character().entity().is_moving());
    }

    #[test]
    fn held_key_against_wall_only_turns() {
        let mut h = Harness::new(grid(3, 1));
        h.grid.add_flags(Icoord::new(1, 0, 0), TileFlags::NOWALK_PLAYER);
        let mut p = placed(&mut h, Icoord::new(0, 0, 0));
        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(!p.start_movement(Ivec2::RIGHT, &mut ctx));
        p.tick(0.5, &mut ctx);
        assert_eq!(p.character().tile(), Icoord::new(0, 0, 0));
        assert_eq!(p.character().entity().facing(), Ivec2::RIGHT);
    }

    #[test]
    fn use_fires_on_faced_tile() {
        let mut h = Harness::new(grid(3, 3));
        let scripts = RecordingScripts::default();
        h.scripts = Box::new(scripts.clone());
        h.grid
            .set_script(Icoord::new(1, 0, 0), TriggerKind::Use, ScriptRef::new("sign.lua"));
        let mut p = placed(&mut h, Icoord::new(1, 1, 0));
        let mut ctx = h.ctx(MoveMode::Turn, 0);

        assert!(!p.start_movement(Ivec2::new(0, 0), &mut ctx));
        p.character_mut().entity_mut().set_facing(Ivec2::UP);
        assert_eq!(p.use_tile(&mut ctx), Some(Icoord::new(1, 0, 0)));
        let calls = scripts.calls_to("sign.lua");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].entity, Some(PLAYER_ID));

        p.character_mut().entity_mut().set_facing(Ivec2::LEFT);
        p.character_mut().place(ctx.grid, Icoord::new(0, 1, 0), 0);
        assert_eq!(p.use_tile(&mut ctx), None);
    }

    #[test]
    fn turn_mode_steps_once_per_press() {
        let mut h = Harness::new(grid(4, 1));
        let mut p = placed(&mut h, Icoord::new(0, 0, 0));
        let mut ctx = h.ctx(MoveMode::Turn, 0);
        assert!(p.start_movement(Ivec2::RIGHT, &mut ctx));
        assert_eq!(p.character().tile(), Icoord::new(1, 0, 0));
        assert!(p.start_movement(Ivec2::RIGHT, &mut ctx));
        assert_eq!(p.character().tile(), Icoord::new(2, 0, 0));
    }
}
