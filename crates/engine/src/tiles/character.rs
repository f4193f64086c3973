use tracing::{debug, info};

use crate::backend::{HookKind, ScriptCommand, ScriptEvent, ScriptHost, ScriptRef, SoundBackend};
use crate::content::MoveMode;

use super::animation::TimeMs;
use super::coords::{phys2pixel, Icoord, Ivec2, Rcoord};
use super::entity::{facing_phase, moving_phase, Entity, EntityId};
use super::grid::{Exit, ExitDir, TileFlags, TileGrid, TriggerKind};
use super::tileset::TileTypes;

/// Borrowed view of an area handed to characters while they move.
pub struct MoveContext<'a> {
    pub grid: &'a mut TileGrid,
    pub types: &'a TileTypes,
    pub scripts: &'a mut dyn ScriptHost,
    pub sounds: &'a mut dyn SoundBackend,
    pub mode: MoveMode,
    pub now: TimeMs,
    pub area: &'a str,
    pub commands: Vec<ScriptCommand>,
    pub exit_taken: Option<Exit>,
}

impl MoveContext<'_> {
    pub fn invoke(
        &mut self,
        script: &ScriptRef,
        hook: HookKind,
        tile: Option<Icoord>,
        entity: Option<EntityId>,
    ) {
        let event = ScriptEvent {
            hook,
            area: self.area,
            tile,
            entity,
        };
        self.scripts.invoke(script, &event, &mut self.commands);
    }

    /// Runs the trigger scripts of `tile`. A script registered on the
    /// coordinate replaces the hooks inherited from the tile's type.
    pub fn run_trigger(&mut self, tile: Icoord, trigger: TriggerKind, entity: EntityId) {
        if !self.grid.in_bounds(tile) {
            return;
        }
        let hook = match trigger {
            TriggerKind::Enter => HookKind::Enter,
            TriggerKind::Leave => HookKind::Leave,
            TriggerKind::Use => HookKind::Use,
        };
        let scripts = match self.grid.script(tile, trigger) {
            Some(script) => vec![script.clone()],
            None => self
                .types
                .hooks(self.grid.tile_type(tile), trigger)
                .to_vec(),
        };
        for script in &scripts {
            self.invoke(script, hook, Some(tile), Some(entity));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterKind {
    Player,
    Npc,
}

/// An entity that lives on the tile grid: it occupies a tile, obeys walk
/// flags, fires tile triggers and can take exits.
#[derive(Debug)]
pub struct Character {
    entity: Entity,
    kind: CharacterKind,
    nowalk_flags: TileFlags,
    nowalk_exempt: TileFlags,
    tile: Icoord,
    placed: bool,
    pending_exit: Option<Exit>,
}

impl Character {
    pub fn new(entity: Entity, kind: CharacterKind) -> Self {
        let (nowalk_flags, nowalk_exempt) = match kind {
            CharacterKind::Player => (
                TileFlags::NOWALK | TileFlags::NOWALK_PLAYER,
                TileFlags::NOWALK_EXIT,
            ),
            CharacterKind::Npc => (
                TileFlags::NOWALK | TileFlags::NOWALK_NPC | TileFlags::NOWALK_EXIT,
                TileFlags::empty(),
            ),
        };
        Self {
            entity,
            kind,
            nowalk_flags,
            nowalk_exempt,
            tile: Icoord::default(),
            placed: false,
            pending_exit: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn kind(&self) -> CharacterKind {
        self.kind
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    /// The tile this character occupies. While moving, the destination.
    pub fn tile(&self) -> Icoord {
        self.tile
    }

    pub fn exempt(&mut self, flags: TileFlags) {
        self.nowalk_exempt |= flags;
    }

    pub fn nowalk_exempt(&self) -> TileFlags {
        self.nowalk_exempt
    }

    /// Puts the character on `tile` at once, without triggers.
    pub fn place(&mut self, grid: &mut TileGrid, tile: Icoord, now: TimeMs) {
        self.leave_grid(grid);
        let tile = grid.wrap(tile);
        self.tile = tile;
        self.placed = true;
        self.pending_exit = None;
        self.entity.stop();
        self.entity
            .set_pixel(phys2pixel(tile, grid.tile_size(), grid.depths()));
        self.entity.set_phase(facing_phase(self.entity.facing()), now);
        grid.occupy(tile, self.id());
    }

    /// Drops occupancy of the current tile.
    pub fn leave_grid(&mut self, grid: &mut TileGrid) {
        if self.placed {
            grid.vacate(self.tile, self.id());
            self.placed = false;
        }
    }

    pub fn is_on_grid(&self) -> bool {
        self.placed
    }

    fn nowalked(&self, grid: &TileGrid, types: &TileTypes, tile: Icoord) -> bool {
        let flags = types.flags(grid.tile_type(tile)) | grid.flags(tile);
        flags.intersects(self.nowalk_flags & !self.nowalk_exempt)
    }

    fn can_move(&self, grid: &TileGrid, types: &TileTypes, dest: Icoord, has_exit: bool) -> bool {
        if has_exit && self.nowalk_exempt.contains(TileFlags::NOWALK_EXIT) {
            return true;
        }
        if !grid.in_bounds(dest) {
            return self.nowalk_exempt.contains(TileFlags::NOWALK_AREA_BOUND);
        }
        if self.nowalked(grid, types, dest) {
            return false;
        }
        !matches!(grid.occupant(dest), Some(other) if other != self.id())
    }

    /// Tries a one-tile step. Facing changes even when the step is refused.
    /// Returns whether the step was taken.
    pub fn move_by_tile(&mut self, delta: Ivec2, ctx: &mut MoveContext<'_>) -> bool {
        if !self.placed
            || self.entity.is_moving()
            || self.entity.is_frozen()
            || !delta.is_unit_cardinal()
        {
            return false;
        }
        self.entity.set_facing(delta);

        let from = self.tile;
        let dest = ctx.grid.move_dest(from, delta);
        let exit = ctx.grid.exit_at(from, delta).cloned().or_else(|| {
            ctx.grid
                .in_bounds(dest)
                .then(|| ctx.grid.exit(dest, ExitDir::Normal).cloned())
                .flatten()
        });

        if !self.can_move(ctx.grid, ctx.types, dest, exit.is_some()) {
            self.entity.set_phase(facing_phase(delta), ctx.now);
            debug!(entity = self.id().0, x = dest.x, y = dest.y, z = dest.z, "move_blocked");
            return false;
        }

        ctx.run_trigger(from, TriggerKind::Leave, self.id());

        ctx.grid.vacate(from, self.id());
        if ctx.grid.in_bounds(dest) {
            ctx.grid.occupy(dest, self.id());
        }
        self.tile = dest;
        self.pending_exit = exit;

        if let Some(step) = self.entity.step_sound() {
            ctx.sounds.play(step);
        }

        let dest_pixel = phys2pixel_unwrapped(dest, ctx.grid);
        match ctx.mode {
            MoveMode::Turn => {
                self.entity.set_pixel(dest_pixel);
                self.arrive(ctx);
            }
            MoveMode::Tile | MoveMode::Notile => {
                self.entity.set_phase(moving_phase(delta), ctx.now);
                self.entity.begin_move(dest_pixel);
            }
        }
        true
    }

    /// Advances an in-progress step. Returns the unused part of `dt` if the
    /// character arrived during this call.
    pub fn tick(&mut self, dt_seconds: f32, ctx: &mut MoveContext<'_>) -> Option<f32> {
        let tile_width = ctx.grid.tile_size().width;
        let leftover = self.entity.advance(dt_seconds, tile_width)?;
        self.arrive(ctx);
        Some(leftover)
    }

    fn arrive(&mut self, ctx: &mut MoveContext<'_>) {
        let grid = &mut *ctx.grid;
        let mut tile = grid.wrap(self.tile);

        if grid.in_bounds(tile) {
            if let Some(depth) = grid.layermod(tile, ExitDir::Normal) {
                grid.vacate(self.tile, self.id());
                tile.z = grid.depths().layer(depth);
                grid.occupy(tile, self.id());
            }
            self.entity
                .set_pixel(phys2pixel(tile, grid.tile_size(), grid.depths()));
        }
        self.tile = tile;
        self.entity
            .set_phase(facing_phase(self.entity.facing()), ctx.now);

        ctx.run_trigger(tile, TriggerKind::Enter, self.id());

        if let Some(exit) = self.pending_exit.take() {
            match self.kind {
                CharacterKind::Player => {
                    info!(area = %exit.area, x = exit.coords.x, y = exit.coords.y, z = exit.coords.z, "exit_taken");
                    ctx.exit_taken = Some(exit);
                }
                CharacterKind::Npc => {
                    debug!(entity = self.id().0, area = %exit.area, "npc_exit_taken");
                    ctx.grid.vacate(self.tile, self.id());
                    self.placed = false;
                    self.entity.destroy();
                }
            }
        }
    }
}

/// Pixel position of a possibly off-grid (looping) tile; the layer must exist.
fn phys2pixel_unwrapped(tile: Icoord, grid: &TileGrid) -> Rcoord {
    let z = if (0..grid.dim().z).contains(&tile.z) {
        tile.z
    } else {
        0
    };
    phys2pixel(Icoord { z, ..tile }, grid.tile_size(), grid.depths())
}


#[cfg(test)]
mod tests {
    use super::test_support::{grid, npc, player, Harness};
    use super::*;
    use crate::backend::RecordingScripts;
    use crate::tiles::coords::Vicoord;
    use crate::tiles::entity::MoveState;
    use crate::tiles::grid::LayerKind;
    use crate::tiles::tileset::TileType;

    #[test]
    fn blocked_step_turns_in_place() {
        let mut h = Harness::new(grid(4, 4));
        h.grid.add_flags(Icoord::new(2, 1, 0), TileFlags::NOWALK);
        let mut c = npc(1);
        c.place(&mut h.grid, Icoord::new(1, 1, 0), 0);

        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(!c.move_by_tile(Ivec2::RIGHT, &mut ctx));
        assert_eq!(c.entity().move_state(), MoveState::Standing);
        assert_eq!(c.tile(), Icoord::new(1, 1, 0));
        assert_eq!(c.entity().facing(), Ivec2::RIGHT);
        assert_eq!(c.entity().phase(), "right");
    }

    #[test]
    fn nowalk_from_tile_type_blocks_too() {
        let mut h = Harness::new(grid(3, 1));
        let wall = h.types.push(TileType::new(TileFlags::NOWALK_NPC, None));
        h.grid.set_tile_type(Icoord::new(1, 0, 0), wall);
        let mut n = npc(1);
        n.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(!n.move_by_tile(Ivec2::RIGHT, &mut ctx));

        let mut p = player();
        p.place(ctx.grid, Icoord::new(2, 0, 0), 0);
        assert!(p.move_by_tile(Ivec2::LEFT, &mut ctx));
    }

    #[test]
    fn occupied_tiles_block_other_characters() {
        let mut h = Harness::new(grid(3, 1));
        let mut a = npc(1);
        let mut b = npc(2);
        a.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        b.place(&mut h.grid, Icoord::new(1, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(!a.move_by_tile(Ivec2::RIGHT, &mut ctx));
    }

    #[test]
    fn leaving_the_area_needs_an_exemption() {
        let mut h = Harness::new(grid(2, 2));
        let mut c = npc(1);
        c.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(!c.move_by_tile(Ivec2::UP, &mut ctx));
        c.exempt(TileFlags::NOWALK_AREA_BOUND);
        assert!(c.move_by_tile(Ivec2::UP, &mut ctx));
    }

    #[test]
    fn guards_reject_moving_frozen_and_diagonal() {
        let mut h = Harness::new(grid(4, 4));
        let mut c = npc(1);
        c.place(&mut h.grid, Icoord::new(1, 1, 0), 0);
        let mut ctx = h.ctx(MoveMode::Tile, 0);

        assert!(!c.move_by_tile(Ivec2::new(1, 1), &mut ctx));
        c.entity_mut().set_frozen(true);
        assert!(!c.move_by_tile(Ivec2::DOWN, &mut ctx));
        c.entity_mut().set_frozen(false);
        assert!(c.move_by_tile(Ivec2::DOWN, &mut ctx));
        assert!(!c.move_by_tile(Ivec2::DOWN, &mut ctx));
    }

    #[test]
    fn occupancy_moves_at_step_start() {
        let mut h = Harness::new(grid(3, 3));
        let mut c = npc(7);
        c.place(&mut h.grid, Icoord::new(1, 1, 0), 0);
        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(c.move_by_tile(Ivec2::LEFT, &mut ctx));
        assert_eq!(ctx.grid.occupant(Icoord::new(1, 1, 0)), None);
        assert_eq!(ctx.grid.occupant(Icoord::new(0, 1, 0)), Some(EntityId(7)));
        assert_eq!(c.entity().phase(), "moving-left");
    }

    #[test]
    fn tile_mode_interpolates_then_arrives() {
        let mut h = Harness::new(grid(3, 3));
        let mut c = npc(1);
        c.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(c.move_by_tile(Ivec2::RIGHT, &mut ctx));

        // 4 tiles/s over 16px tiles: a step takes 0.25s
        assert_eq!(c.tick(0.125, &mut ctx), None);
        assert!(c.entity().is_moving());
        let leftover = c.tick(0.25, &mut ctx).expect("arrived");
        assert!((leftover - 0.125).abs() < 0.001);
        assert_eq!(c.entity().pixel(), Rcoord::new(16.0, 0.0, 0.0));
        assert_eq!(c.entity().phase(), "right");
    }

    #[test]
    fn turn_mode_steps_instantly() {
        let mut h = Harness::new(grid(3, 3));
        let mut c = npc(1);
        c.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Turn, 0);
        assert!(c.move_by_tile(Ivec2::DOWN, &mut ctx));
        assert!(!c.entity().is_moving());
        assert_eq!(c.entity().pixel(), Rcoord::new(0.0, 16.0, 0.0));
    }

    #[test]
    fn leave_and_enter_scripts_fire_with_coordinate_override() {
        let mut h = Harness::new(grid(3, 1));
        let scripts = RecordingScripts::default();
        h.scripts = Box::new(scripts.clone());
        let mut typed = TileType::default();
        typed.add_hook(TriggerKind::Enter, ScriptRef::new("type_enter.lua"));
        let gid = h.types.push(typed);
        h.grid.set_tile_type(Icoord::new(1, 0, 0), gid);
        h.grid.set_tile_type(Icoord::new(2, 0, 0), gid);
        h.grid
            .set_script(Icoord::new(2, 0, 0), TriggerKind::Enter, ScriptRef::new("coord_enter.lua"));
        h.grid
            .set_script(Icoord::new(0, 0, 0), TriggerKind::Leave, ScriptRef::new("leave.lua"));

        let mut c = npc(3);
        c.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Turn, 0);
        assert!(c.move_by_tile(Ivec2::RIGHT, &mut ctx));
        assert!(c.move_by_tile(Ivec2::RIGHT, &mut ctx));

        assert_eq!(scripts.calls_to("leave.lua").len(), 1);
        let typed_calls = scripts.calls_to("type_enter.lua");
        assert_eq!(typed_calls.len(), 1);
        assert_eq!(typed_calls[0].tile, Some(Icoord::new(1, 0, 0)));
        assert_eq!(typed_calls[0].entity, Some(EntityId(3)));
        assert_eq!(scripts.calls_to("coord_enter.lua").len(), 1);
    }

    #[test]
    fn player_takes_exits_even_on_nowalk_tiles() {
        let mut h = Harness::new(grid(3, 1));
        let door = Icoord::new(2, 0, 0);
        h.grid.add_flags(door, TileFlags::NOWALK | TileFlags::NOWALK_EXIT);
        let exit = Exit {
            area: "house.json".to_string(),
            coords: Vicoord::new(4, 9, 0.0),
        };
        h.grid.set_exit(door, ExitDir::Normal, exit.clone());

        let mut p = player();
        p.place(&mut h.grid, Icoord::new(1, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Turn, 0);
        assert!(p.move_by_tile(Ivec2::RIGHT, &mut ctx));
        assert_eq!(ctx.exit_taken, Some(exit));
    }

    #[test]
    fn npcs_avoid_exits_unless_exempt_and_then_vanish() {
        let mut h = Harness::new(grid(3, 1));
        let door = Icoord::new(1, 0, 0);
        h.grid.add_flags(door, TileFlags::NOWALK_EXIT);
        h.grid.set_exit(
            door,
            ExitDir::Normal,
            Exit {
                area: "house.json".to_string(),
                coords: Vicoord::new(0, 0, 0.0),
            },
        );
        let mut n = npc(4);
        n.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Turn, 0);
        assert!(!n.move_by_tile(Ivec2::RIGHT, &mut ctx));

        n.exempt(TileFlags::NOWALK_EXIT);
        assert!(n.move_by_tile(Ivec2::RIGHT, &mut ctx));
        assert!(n.entity().is_dead());
        assert_eq!(ctx.exit_taken, None);
        assert_eq!(ctx.grid.occupant(door), None);
    }

    #[test]
    fn arriving_on_a_layermod_switches_layer() {
        let mut g = grid(3, 1);
        g.add_layer(1.0, LayerKind::Objects).expect("layer");
        g.set_layermod(Icoord::new(1, 0, 0), ExitDir::Normal, 1.0);
        let mut h = Harness::new(g);
        let mut c = npc(1);
        c.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Turn, 0);
        assert!(c.move_by_tile(Ivec2::RIGHT, &mut ctx));
        assert_eq!(c.tile(), Icoord::new(1, 0, 1));
        assert_eq!(c.entity().pixel().z, 1.0);
        assert_eq!(ctx.grid.occupant(Icoord::new(1, 0, 1)), Some(EntityId(1)));
        assert_eq!(ctx.grid.occupant(Icoord::new(1, 0, 0)), None);
    }

    #[test]
    fn looping_steps_wrap_on_arrival() {
        let mut g = grid(3, 1);
        g.set_looping(true, false);
        let mut h = Harness::new(g);
        let mut c = npc(1);
        c.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        let mut ctx = h.ctx(MoveMode::Tile, 0);
        assert!(c.move_by_tile(Ivec2::LEFT, &mut ctx));
        assert!(c.tick(1.0, &mut ctx).is_some());
        assert_eq!(c.tile(), Icoord::new(2, 0, 0));
        assert_eq!(c.entity().pixel().x, 32.0);
        assert_eq!(ctx.grid.occupant(Icoord::new(2, 0, 0)), Some(EntityId(1)));
    }

    #[test]
    fn step_sound_plays_on_each_step() {
        let mut h = Harness::new(grid(3, 1));
        let step = h.sounds.load_sound("step.ogg").expect("sound");
        let mut sprite = crate::tiles::entity::test_support::sprite(4.0);
        sprite.step_sound = Some(step);
        let mut c = Character::new(Entity::new(EntityId(1), "npc.json", &sprite), CharacterKind::Npc);
        c.place(&mut h.grid, Icoord::new(0, 0, 0), 0);
        {
            let mut ctx = h.ctx(MoveMode::Turn, 0);
            assert!(c.move_by_tile(Ivec2::RIGHT, &mut ctx));
        }
        assert_eq!(h.sounds.play_count(), 1);
    }
}
