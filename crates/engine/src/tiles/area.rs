use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::app::{Color, DisplayList, DrawItem, Viewport};
use crate::backend::{
    Backends, HookKind, PlayingHandle, ScriptCommand, ScriptEvent, ScriptRef,
};
use crate::content::MoveMode;

use super::animation::TimeMs;
use super::character::{Character, CharacterKind, MoveContext};
use super::coords::{virt2pixel, Icoord, Icube, Ivec2, Vicoord};
use super::entity::{Entity, EntityId, EntitySprite};
use super::grid::{Exit, LayerKind, TileGrid};
use super::overlay::Overlay;
use super::player::Player;
use super::tileset::{TileSet, TileTypes};

/// Commands produced while applying commands are applied too, up to this
/// many rounds per hook.
const MAX_COMMAND_ROUNDS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct AreaHooks {
    pub on_load: Option<ScriptRef>,
    pub on_focus: Option<ScriptRef>,
    pub on_tick: Option<ScriptRef>,
    pub on_turn: Option<ScriptRef>,
}

#[derive(Debug, Clone, Default)]
pub struct AreaProperties {
    pub name: String,
    pub music: Option<String>,
    pub color_overlay: Option<Color>,
    pub hooks: AreaHooks,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    #[error("depth {depth} is not a layer of area {area}")]
    UnknownDepth { area: String, depth: f32 },
    #[error("tile ({x}, {y}) is outside area {area}")]
    OutOfBounds { area: String, x: i32, y: i32 },
}

/// One loaded map: its grid, tile types and the characters and overlays
/// living in it.
#[derive(Debug)]
pub struct Area {
    descriptor: String,
    props: AreaProperties,
    grid: TileGrid,
    tilesets: BTreeMap<String, TileSet>,
    types: TileTypes,
    characters: Vec<Character>,
    overlays: Vec<Overlay>,
    redraw: bool,
    type_checked: Vec<bool>,
    player_exit: Option<Exit>,
    music: Option<PlayingHandle>,
    load_hook_ran: bool,
    rollover: Vec<(EntityId, f32)>,
}

impl Area {
    pub fn new(
        descriptor: &str,
        props: AreaProperties,
        grid: TileGrid,
        tilesets: BTreeMap<String, TileSet>,
        types: TileTypes,
    ) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            props,
            grid,
            tilesets,
            types,
            characters: Vec::new(),
            overlays: Vec::new(),
            redraw: true,
            type_checked: Vec::new(),
            player_exit: None,
            music: None,
            load_hook_ran: false,
            rollover: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.props.name
    }

    pub fn properties(&self) -> &AreaProperties {
        &self.props
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TileGrid {
        &mut self.grid
    }

    pub fn types(&self) -> &TileTypes {
        &self.types
    }

    pub fn tilesets(&self) -> &BTreeMap<String, TileSet> {
        &self.tilesets
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id() == id)
    }

    pub fn character_mut(&mut self, id: EntityId) -> Option<&mut Character> {
        self.characters.iter_mut().find(|c| c.id() == id)
    }

    pub fn overlay(&self, id: EntityId) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id() == id)
    }

    pub fn request_redraw(&mut self) {
        self.redraw = true;
    }

    /// Physical tile for a virtual coordinate, checked against this area.
    pub fn virt_to_phys(&self, at: Vicoord) -> Result<Icoord, PlacementError> {
        let Some(z) = self.grid.depths().layer_of(at.z) else {
            return Err(PlacementError::UnknownDepth {
                area: self.descriptor.clone(),
                depth: at.z,
            });
        };
        let phys = Icoord::new(at.x, at.y, z);
        if !self.grid.in_bounds(phys) {
            return Err(PlacementError::OutOfBounds {
                area: self.descriptor.clone(),
                x: at.x,
                y: at.y,
            });
        }
        Ok(phys)
    }

    pub fn place_player(&mut self, player: &mut Player, at: Vicoord, now: TimeMs) -> Result<(), PlacementError> {
        let phys = self.virt_to_phys(at)?;
        player.character_mut().place(&mut self.grid, phys, now);
        self.redraw = true;
        Ok(())
    }

    pub fn remove_player(&mut self, player: &mut Player) {
        player.character_mut().leave_grid(&mut self.grid);
    }

    pub fn spawn_npc(
        &mut self,
        id: EntityId,
        descriptor: &str,
        sprite: &EntitySprite,
        at: Vicoord,
        phase: &str,
        now: TimeMs,
    ) -> Result<EntityId, PlacementError> {
        let phys = self.virt_to_phys(at)?;
        let mut npc = Character::new(Entity::new(id, descriptor, sprite), CharacterKind::Npc);
        npc.place(&mut self.grid, phys, now);
        npc.entity_mut().set_phase(phase, now);
        self.characters.push(npc);
        self.redraw = true;
        debug!(area = %self.descriptor, entity = id.0, descriptor, x = at.x, y = at.y, "npc_spawned");
        Ok(id)
    }

    pub fn spawn_overlay(
        &mut self,
        id: EntityId,
        descriptor: &str,
        sprite: &EntitySprite,
        at: Vicoord,
        phase: &str,
        now: TimeMs,
    ) -> Result<EntityId, PlacementError> {
        if self.grid.depths().layer_of(at.z).is_none() {
            return Err(PlacementError::UnknownDepth {
                area: self.descriptor.clone(),
                depth: at.z,
            });
        }
        let mut entity = Entity::new(id, descriptor, sprite);
        entity.set_phase(phase, now);
        let pixel = virt2pixel(at, self.grid.tile_size());
        self.overlays.push(Overlay::new(entity, pixel));
        self.redraw = true;
        debug!(area = %self.descriptor, entity = id.0, descriptor, "overlay_spawned");
        Ok(id)
    }

    pub fn run_load_hook(&mut self, now: TimeMs, mode: MoveMode, player: &mut Player, backends: &mut Backends) {
        if self.load_hook_ran {
            return;
        }
        self.load_hook_ran = true;
        self.run_hook(HookKind::Load, now, mode, player, backends);
    }

    /// Called when the world switches to this area: fires `on_focus` and
    /// starts the area's music.
    pub fn focus(&mut self, now: TimeMs, mode: MoveMode, player: &mut Player, backends: &mut Backends) {
        self.run_hook(HookKind::Focus, now, mode, player, backends);
        if let Some(path) = &self.props.music {
            let already_playing = self
                .music
                .is_some_and(|playing| backends.sounds.is_playing(playing));
            if !already_playing {
                match backends.sounds.load_sound(path) {
                    Some(sound) => self.music = Some(backends.sounds.play(sound)),
                    None => warn!(area = %self.descriptor, music = %path, "music_missing"),
                }
            }
        }
        self.redraw = true;
    }

    pub fn unfocus(&mut self, backends: &mut Backends) {
        if let Some(playing) = self.music.take() {
            backends.sounds.stop(playing);
        }
    }

    pub fn take_player_exit(&mut self) -> Option<Exit> {
        self.player_exit.take()
    }

    pub fn tick(
        &mut self,
        dt_seconds: f32,
        now: TimeMs,
        mode: MoveMode,
        player: &mut Player,
        backends: &mut Backends,
    ) {
        self.run_hook(HookKind::Tick, now, mode, player, backends);

        let mut commands = Vec::new();
        let tile = self.grid.tile_size();
        for overlay in &mut self.overlays {
            if let Some(hook) = overlay.entity().hooks().on_tick.clone() {
                let event = ScriptEvent {
                    hook: HookKind::Tick,
                    area: &self.descriptor,
                    tile: None,
                    entity: Some(overlay.id()),
                };
                backends.scripts.invoke(&hook, &event, &mut commands);
            }
            overlay.tick(dt_seconds, tile, now);
        }

        let mut ctx = MoveContext {
            grid: &mut self.grid,
            types: &self.types,
            scripts: backends.scripts.as_mut(),
            sounds: backends.sounds.as_mut(),
            mode,
            now,
            area: &self.descriptor,
            commands,
            exit_taken: None,
        };
        if mode != MoveMode::Turn {
            for character in &mut self.characters {
                if character.entity().is_dead() {
                    continue;
                }
                if let Some(hook) = character.entity().hooks().on_tick.clone() {
                    ctx.invoke(&hook, HookKind::Tick, None, Some(character.id()));
                }
                if let Some(leftover) = character.tick(dt_seconds, &mut ctx) {
                    if leftover > 0.0 && !character.entity().is_dead() {
                        self.rollover.push((character.id(), leftover));
                    }
                }
            }
            player.tick(dt_seconds, &mut ctx);
        }
        let MoveContext {
            commands,
            exit_taken,
            ..
        } = ctx;

        self.note_player_exit(exit_taken);
        self.apply_commands(commands, now, mode, player, backends);
        self.rollover.clear();
        self.sweep_dead();
    }

    /// One turn in turn-based mode: area hook, then every overlay and
    /// character's `on_turn` hook.
    pub fn turn(&mut self, now: TimeMs, mode: MoveMode, player: &mut Player, backends: &mut Backends) {
        self.run_hook(HookKind::Turn, now, mode, player, backends);

        let mut commands = Vec::new();
        let hooks = self
            .overlays
            .iter()
            .map(|o| (o.id(), o.entity().hooks().on_turn.clone()))
            .chain(
                self.characters
                    .iter()
                    .filter(|c| !c.entity().is_dead())
                    .map(|c| (c.id(), c.entity().hooks().on_turn.clone())),
            )
            .filter_map(|(id, hook)| hook.map(|hook| (id, hook)))
            .collect::<Vec<_>>();
        for (id, hook) in &hooks {
            let event = ScriptEvent {
                hook: HookKind::Turn,
                area: &self.descriptor,
                tile: None,
                entity: Some(*id),
            };
            backends.scripts.invoke(hook, &event, &mut commands);
        }

        self.apply_commands(commands, now, mode, player, backends);
        self.sweep_dead();
    }

    pub fn player_start_movement(
        &mut self,
        player: &mut Player,
        dir: Ivec2,
        now: TimeMs,
        mode: MoveMode,
        backends: &mut Backends,
    ) -> bool {
        let mut ctx = MoveContext {
            grid: &mut self.grid,
            types: &self.types,
            scripts: backends.scripts.as_mut(),
            sounds: backends.sounds.as_mut(),
            mode,
            now,
            area: &self.descriptor,
            commands: Vec::new(),
            exit_taken: None,
        };
        let moved = player.start_movement(dir, &mut ctx);
        let MoveContext {
            commands,
            exit_taken,
            ..
        } = ctx;

        self.note_player_exit(exit_taken);
        self.apply_commands(commands, now, mode, player, backends);
        self.sweep_dead();
        moved
    }

    /// The player uses the faced tile. A character standing there gets its
    /// `on_use` hook run as well.
    pub fn player_use(&mut self, player: &mut Player, now: TimeMs, mode: MoveMode, backends: &mut Backends) {
        let mut ctx = MoveContext {
            grid: &mut self.grid,
            types: &self.types,
            scripts: backends.scripts.as_mut(),
            sounds: backends.sounds.as_mut(),
            mode,
            now,
            area: &self.descriptor,
            commands: Vec::new(),
            exit_taken: None,
        };
        if let Some(target) = player.use_tile(&mut ctx) {
            let used = ctx
                .grid
                .occupant(target)
                .and_then(|id| self.characters.iter().find(|c| c.id() == id))
                .and_then(|c| c.entity().hooks().on_use.clone().map(|hook| (c.id(), hook)));
            if let Some((id, hook)) = used {
                ctx.invoke(&hook, HookKind::Use, Some(target), Some(id));
            }
        }
        let commands = ctx.commands;

        self.apply_commands(commands, now, mode, player, backends);
        self.sweep_dead();
    }

    fn run_hook(&mut self, hook: HookKind, now: TimeMs, mode: MoveMode, player: &mut Player, backends: &mut Backends) {
        let hooks = &self.props.hooks;
        let script = match hook {
            HookKind::Load => hooks.on_load.clone(),
            HookKind::Focus => hooks.on_focus.clone(),
            HookKind::Tick => hooks.on_tick.clone(),
            HookKind::Turn => hooks.on_turn.clone(),
            HookKind::Enter | HookKind::Leave | HookKind::Use => None,
        };
        let Some(script) = script else {
            return;
        };
        let mut commands = Vec::new();
        let event = ScriptEvent {
            hook,
            area: &self.descriptor,
            tile: None,
            entity: None,
        };
        backends.scripts.invoke(&script, &event, &mut commands);
        self.apply_commands(commands, now, mode, player, backends);
    }

    fn note_player_exit(&mut self, exit: Option<Exit>) {
        if exit.is_some() {
            self.player_exit = exit;
        }
    }

    fn apply_commands(
        &mut self,
        mut commands: Vec<ScriptCommand>,
        now: TimeMs,
        mode: MoveMode,
        player: &mut Player,
        backends: &mut Backends,
    ) {
        let tile = self.grid.tile_size();
        let mut rounds = 0;
        while !commands.is_empty() {
            if rounds == MAX_COMMAND_ROUNDS {
                warn!(area = %self.descriptor, dropped = commands.len(), "script_commands_dropped");
                return;
            }
            rounds += 1;

            let mut ctx = MoveContext {
                grid: &mut self.grid,
                types: &self.types,
                scripts: backends.scripts.as_mut(),
                sounds: backends.sounds.as_mut(),
                mode,
                now,
                area: &self.descriptor,
                commands: Vec::new(),
                exit_taken: None,
            };
            for command in commands {
                match command {
                    ScriptCommand::Destroy(id) => {
                        if id == player.character().id() {
                            warn!(area = %self.descriptor, "player_destroy_ignored");
                        } else if let Some(c) = self.characters.iter_mut().find(|c| c.id() == id) {
                            c.entity_mut().destroy();
                        } else if let Some(o) = self.overlays.iter_mut().find(|o| o.id() == id) {
                            o.entity_mut().destroy();
                        }
                    }
                    ScriptCommand::MoveByTile { entity, delta } => {
                        if entity == player.character().id() {
                            player.character_mut().move_by_tile(delta, &mut ctx);
                        } else if let Some(c) = self.characters.iter_mut().find(|c| c.id() == entity) {
                            if !c.move_by_tile(delta, &mut ctx) {
                                continue;
                            }
                            // A step chained from arrival spends the travel time the arrival left over.
                            if let Some(at) = self.rollover.iter().position(|&(id, _)| id == entity) {
                                let (_, leftover) = self.rollover.swap_remove(at);
                                if let Some(rest) = c.tick(leftover, &mut ctx) {
                                    if rest > 0.0 && !c.entity().is_dead() {
                                        self.rollover.push((entity, rest));
                                    }
                                }
                            }
                        } else if let Some(o) = self.overlays.iter_mut().find(|o| o.id() == entity) {
                            o.move_by_tile(delta, tile, mode, now);
                        }
                    }
                    ScriptCommand::SetFrozen { entity, frozen } => {
                        if entity == player.character().id() {
                            player.character_mut().entity_mut().set_frozen(frozen);
                        } else if let Some(c) = self.characters.iter_mut().find(|c| c.id() == entity) {
                            c.entity_mut().set_frozen(frozen);
                        } else if let Some(o) = self.overlays.iter_mut().find(|o| o.id() == entity) {
                            o.entity_mut().set_frozen(frozen);
                        }
                    }
                    ScriptCommand::RequestRedraw => self.redraw = true,
                }
            }
            let MoveContext {
                commands: next,
                exit_taken,
                ..
            } = ctx;
            commands = next;
            self.note_player_exit(exit_taken);
        }
    }

    /// Removes destroyed entities. Runs only after a full pass over them.
    fn sweep_dead(&mut self) {
        let before = self.characters.len() + self.overlays.len();
        let grid = &mut self.grid;
        self.characters.retain_mut(|c| {
            if c.entity().is_dead() {
                c.leave_grid(grid);
                false
            } else {
                true
            }
        });
        self.overlays.retain(|o| !o.entity().is_dead());
        if self.characters.len() + self.overlays.len() != before {
            self.redraw = true;
        }
    }

    /// Tiles under the viewport, rounded outward. Only non-looping axes are
    /// clamped, so looping axes may report coordinates outside the grid.
    pub fn visible_tiles(&self, viewport: &Viewport) -> Icube {
        let tile = self.grid.tile_size();
        let (tw, th) = (tile.width as f32, tile.height as f32);
        let (ox, oy) = viewport.offset();
        let (w, h) = viewport.resolution();
        let dim = self.grid.dim();

        let mut cube = Icube {
            x1: (ox / tw).floor() as i32,
            y1: (oy / th).floor() as i32,
            z1: 0,
            x2: ((ox + w) / tw).ceil() as i32,
            y2: ((oy + h) / th).ceil() as i32,
            z2: dim.z,
        };
        if !self.grid.loops_x() {
            cube.x1 = cube.x1.clamp(0, dim.x);
            cube.x2 = cube.x2.clamp(0, dim.x);
        }
        if !self.grid.loops_y() {
            cube.y1 = cube.y1.clamp(0, dim.y);
            cube.y2 = cube.y2.clamp(0, dim.y);
        }
        cube
    }

    pub fn needs_redraw(&mut self, now: TimeMs, viewport: &Viewport, player: &Player) -> bool {
        if self.redraw {
            return true;
        }
        let tile = self.grid.tile_size();
        let visible = viewport.pixel_rect();
        if player.character().entity().needs_redraw(now, tile, &visible)
            || self
                .characters
                .iter()
                .any(|c| c.entity().needs_redraw(now, tile, &visible))
            || self
                .overlays
                .iter()
                .any(|o| o.entity().needs_redraw(now, tile, &visible))
        {
            return true;
        }

        let cube = self.visible_tiles(viewport);
        self.type_checked.clear();
        self.type_checked.resize(self.types.len(), false);
        for z in cube.z1..cube.z2 {
            if self.grid.layer_kind(z) != Some(LayerKind::Tiles) {
                continue;
            }
            for y in cube.y1..cube.y2 {
                for x in cube.x1..cube.x2 {
                    let c = Icoord::new(x, y, z);
                    if !self.grid.in_bounds(c) {
                        continue;
                    }
                    let ty = self.grid.tile_type(c);
                    match self.type_checked.get_mut(ty as usize) {
                        Some(checked) if !*checked => *checked = true,
                        _ => continue,
                    }
                    if self
                        .types
                        .animation(ty)
                        .is_some_and(|anim| anim.needs_redraw(now))
                    {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Appends the visible tiles and every entity to `display`, layer by
    /// layer. Tile positions are not wrapped.
    pub fn draw(&mut self, now: TimeMs, viewport: &Viewport, player: &mut Player, display: &mut DisplayList) {
        display.set_offset(viewport.offset());
        display.set_color_overlay(self.props.color_overlay);

        let cube = self.visible_tiles(viewport);
        let tile = self.grid.tile_size();
        for z in 0..self.grid.dim().z {
            let depth = self.grid.depths().depth(z);
            if self.grid.layer_kind(z) == Some(LayerKind::Tiles) {
                for y in cube.y1..cube.y2 {
                    for x in cube.x1..cube.x2 {
                        let c = Icoord::new(x, y, z);
                        if !self.grid.in_bounds(c) {
                            continue;
                        }
                        let Some(anim) = self.types.animation(self.grid.tile_type(c)) else {
                            continue;
                        };
                        display.push(DrawItem {
                            image: anim.set_frame(now),
                            x: (x * tile.width as i32) as f32,
                            y: (y * tile.height as i32) as f32,
                            depth,
                        });
                    }
                }
            }

            for overlay in &mut self.overlays {
                if overlay.entity().pixel().z == depth {
                    overlay.entity_mut().draw(now, tile, display);
                }
            }
            for character in &mut self.characters {
                if character.entity().pixel().z == depth {
                    character.entity_mut().draw(now, tile, display);
                }
            }
            let body = player.character_mut();
            if body.is_on_grid() && body.entity().pixel().z == depth {
                body.entity_mut().draw(now, tile, display);
            }
        }
        self.redraw = false;
    }
}
