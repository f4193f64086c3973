use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::{DisplayList, Key, KeyEvent, Viewport};
use crate::backend::{Backends, HookKind, ScriptEvent};
use crate::content::{
    load_area, load_entity, load_script, load_world_config, AreaLoadError, ConfigError, EntityLoadError,
    MoveMode, WorldConfig, WORLD_CONFIG_PATH,
};

use super::animation::TimeMs;
use super::area::{Area, PlacementError};
use super::coords::{Ivec2, Vicoord};
use super::entity::{EntityId, EntityIdAllocator, EntitySprite};
use super::player::Player;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    AreaLoad(#[from] AreaLoadError),
    #[error(transparent)]
    Entity(#[from] EntityLoadError),
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error("no area has been focused yet")]
    NoFocusedArea,
}

/// The running simulation: every loaded area, the player, the clock and
/// the collaborators they call out to.
pub struct World {
    config: WorldConfig,
    backends: Backends,
    areas: HashMap<String, Area>,
    focused: Option<String>,
    player: Player,
    viewport: Viewport,
    sprites: HashMap<String, EntitySprite>,
    ids: EntityIdAllocator,
    paused: u32,
    total: Duration,
    quit: bool,
}

impl World {
    /// Reads the world configuration from the resources, then starts.
    pub fn load(backends: Backends) -> Result<Self, WorldError> {
        let config = load_world_config(backends.resources.as_ref(), WORLD_CONFIG_PATH)?;
        Self::new(config, backends)
    }

    /// Loads the player, runs the init script and focuses the start area.
    pub fn new(config: WorldConfig, mut backends: Backends) -> Result<Self, WorldError> {
        let sprite = load_sprite(&config, &config.player.descriptor, &mut backends)?;
        let mut player = Player::new(&config.player.descriptor, &sprite);
        player
            .character_mut()
            .entity_mut()
            .set_phase(&config.player.phase, 0);
        let mut sprites = HashMap::new();
        sprites.insert(config.player.descriptor.clone(), sprite);

        let viewport = Viewport::new(config.viewport.width as f32, config.viewport.height as f32);
        let mut world = Self {
            config,
            backends,
            areas: HashMap::new(),
            focused: None,
            player,
            viewport,
            sprites,
            ids: EntityIdAllocator::default(),
            paused: 0,
            total: Duration::ZERO,
            quit: false,
        };
        world.run_init_script();

        let start = world.config.start.clone();
        world.focus_area(&start.area, Vicoord::new(start.x, start.y, start.z))?;
        info!(
            world = %world.config.name,
            move_mode = ?world.config.move_mode,
            area = %start.area,
            "world_started"
        );
        Ok(world)
    }

    fn run_init_script(&mut self) {
        let Some(path) = self.config.on_init.clone() else {
            return;
        };
        let Some(script) = load_script(&path, WORLD_CONFIG_PATH, &mut self.backends) else {
            return;
        };
        let mut commands = Vec::new();
        let event = ScriptEvent {
            hook: HookKind::Load,
            area: "",
            tile: None,
            entity: None,
        };
        self.backends.scripts.invoke(&script, &event, &mut commands);
        if !commands.is_empty() {
            debug!(dropped = commands.len(), "init_script_commands_ignored");
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn backends_mut(&mut self) -> &mut Backends {
        &mut self.backends
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn area(&self, descriptor: &str) -> Option<&Area> {
        self.areas.get(descriptor)
    }

    pub fn focused_area(&self) -> Option<&Area> {
        self.focused.as_ref().and_then(|d| self.areas.get(d))
    }

    fn focused_area_mut(&mut self) -> Result<&mut Area, WorldError> {
        self.focused
            .as_ref()
            .and_then(|d| self.areas.get_mut(d))
            .ok_or(WorldError::NoFocusedArea)
    }

    /// Unpaused world time.
    pub fn time(&self) -> Duration {
        self.total
    }

    fn now_ms(&self) -> TimeMs {
        self.total.as_millis() as TimeMs
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    /// Nested: every `set_paused(true)` needs its own `set_paused(false)`.
    pub fn set_paused(&mut self, paused: bool) {
        if paused {
            self.paused += 1;
        } else if self.paused == 0 {
            warn!("unpause_without_pause");
        } else {
            self.paused -= 1;
        }
        if let Ok(area) = self.focused_area_mut() {
            area.request_redraw();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused > 0
    }

    /// Moves the player into `descriptor` at `at`, loading the area on first
    /// visit. A failed load leaves the current focus untouched.
    pub fn focus_area(&mut self, descriptor: &str, at: Vicoord) -> Result<(), WorldError> {
        let now = self.now_ms();
        let mode = self.config.move_mode;

        if !self.areas.contains_key(descriptor) {
            let area = load_area(descriptor, &mut self.backends)?;
            self.areas.insert(descriptor.to_string(), area);
        }
        let Some(target) = self.areas.get(descriptor) else {
            return Err(WorldError::NoFocusedArea);
        };
        target.virt_to_phys(at)?;

        if let Some(previous) = self.focused.take() {
            if let Some(old) = self.areas.get_mut(&previous) {
                old.remove_player(&mut self.player);
                if previous != descriptor {
                    old.unfocus(&mut self.backends);
                }
            }
        }

        let Some(area) = self.areas.get_mut(descriptor) else {
            return Err(WorldError::NoFocusedArea);
        };
        area.place_player(&mut self.player, at, now)?;
        self.focused = Some(descriptor.to_string());

        let dim = area.grid().dim();
        let tile = area.grid().tile_size();
        self.viewport.set_bounds(
            (dim.x * tile.width as i32) as f32,
            (dim.y * tile.height as i32) as f32,
            area.grid().loops_x(),
            area.grid().loops_y(),
        );

        area.run_load_hook(now, mode, &mut self.player, &mut self.backends);
        area.focus(now, mode, &mut self.player, &mut self.backends);
        area.request_redraw();
        self.track_player();

        info!(area = descriptor, x = at.x, y = at.y, z = at.z, "area_focused");
        Ok(())
    }

    fn track_player(&mut self) {
        let Some(tile) = self.focused_area().map(|a| a.grid().tile_size()) else {
            return;
        };
        let r = self.player.character().entity().pixel();
        self.viewport.track(
            r.x + tile.width as f32 / 2.0,
            r.y + tile.height as f32 / 2.0,
        );
    }

    /// Advances the focused area by `dt`. A no-op while paused.
    pub fn tick(&mut self, dt: Duration) -> Result<(), WorldError> {
        if self.is_paused() {
            return Ok(());
        }
        self.total += dt;
        let now = self.now_ms();
        let mode = self.config.move_mode;
        let Some(area) = self.focused.as_ref().and_then(|d| self.areas.get_mut(d)) else {
            return Err(WorldError::NoFocusedArea);
        };
        area.tick(dt.as_secs_f32(), now, mode, &mut self.player, &mut self.backends);
        self.after_step()
    }

    /// One turn of turn-based mode.
    pub fn turn(&mut self) -> Result<(), WorldError> {
        if self.is_paused() {
            return Ok(());
        }
        let now = self.now_ms();
        let mode = self.config.move_mode;
        let Some(area) = self.focused.as_ref().and_then(|d| self.areas.get_mut(d)) else {
            return Err(WorldError::NoFocusedArea);
        };
        area.turn(now, mode, &mut self.player, &mut self.backends);
        self.after_step()
    }

    fn after_step(&mut self) -> Result<(), WorldError> {
        let exit = self.focused_area_mut()?.take_player_exit();
        if let Some(exit) = exit {
            self.focus_area(&exit.area, exit.coords)?;
        }
        self.track_player();
        Ok(())
    }

    pub fn handle_key(&mut self, event: KeyEvent) -> Result<(), WorldError> {
        if let Some(dir) = key_direction(event.key) {
            if !event.pressed {
                self.player.stop_movement(dir);
                return Ok(());
            }
            if self.is_paused() {
                return Ok(());
            }
            let now = self.now_ms();
            let mode = self.config.move_mode;
            let Some(area) = self.focused.as_ref().and_then(|d| self.areas.get_mut(d)) else {
                return Err(WorldError::NoFocusedArea);
            };
            let moved = area.player_start_movement(&mut self.player, dir, now, mode, &mut self.backends);
            if moved && mode == MoveMode::Turn {
                return self.turn();
            }
            return self.after_step();
        }

        if !event.pressed {
            return Ok(());
        }
        match event.key {
            Key::Escape => {
                info!(reason = "escape_key", "shutdown_requested");
                self.quit = true;
            }
            Key::Use if !self.is_paused() => {
                let now = self.now_ms();
                let mode = self.config.move_mode;
                let Some(area) = self.focused.as_ref().and_then(|d| self.areas.get_mut(d)) else {
                    return Err(WorldError::NoFocusedArea);
                };
                area.player_use(&mut self.player, now, mode, &mut self.backends);
                if mode == MoveMode::Turn {
                    return self.turn();
                }
                return self.after_step();
            }
            _ => {}
        }
        Ok(())
    }

    pub fn needs_redraw(&mut self) -> bool {
        let now = self.now_ms();
        match self.focused.as_ref().and_then(|d| self.areas.get_mut(d)) {
            Some(area) => area.needs_redraw(now, &self.viewport, &self.player),
            None => false,
        }
    }

    /// Rebuilds `display` from the focused area.
    pub fn draw(&mut self, display: &mut DisplayList) {
        display.clear();
        let now = self.now_ms();
        if let Some(area) = self.focused.as_ref().and_then(|d| self.areas.get_mut(d)) {
            area.draw(now, &self.viewport, &mut self.player, display);
        }
    }

    /// Hands a display list to the image backend in depth order.
    pub fn present(&mut self, display: &mut DisplayList) {
        display.sort_by_depth();
        let (ox, oy) = display.offset();
        for item in display.items() {
            self.backends
                .images
                .draw_image(item.image, item.x - ox, item.y - oy, item.depth);
        }
    }

    fn entity_sprite(&mut self, descriptor: &str) -> Result<EntitySprite, WorldError> {
        if let Some(sprite) = self.sprites.get(descriptor) {
            return Ok(sprite.clone());
        }
        let sprite = load_sprite(&self.config, descriptor, &mut self.backends)?;
        self.sprites.insert(descriptor.to_string(), sprite.clone());
        Ok(sprite)
    }

    pub fn spawn_npc(&mut self, descriptor: &str, at: Vicoord, phase: &str) -> Result<EntityId, WorldError> {
        let sprite = self.entity_sprite(descriptor)?;
        let id = self.ids.allocate();
        let now = self.now_ms();
        let area = self.focused_area_mut()?;
        Ok(area.spawn_npc(id, descriptor, &sprite, at, phase, now)?)
    }

    pub fn spawn_overlay(&mut self, descriptor: &str, at: Vicoord, phase: &str) -> Result<EntityId, WorldError> {
        let sprite = self.entity_sprite(descriptor)?;
        let id = self.ids.allocate();
        let now = self.now_ms();
        let area = self.focused_area_mut()?;
        Ok(area.spawn_overlay(id, descriptor, &sprite, at, phase, now)?)
    }
}

fn load_sprite(
    config: &WorldConfig,
    descriptor: &str,
    backends: &mut Backends,
) -> Result<EntitySprite, WorldError> {
    let mut sprite = load_entity(descriptor, backends)?;
    if !config.step_sounds {
        sprite.step_sound = None;
    }
    Ok(sprite)
}

fn key_direction(key: Key) -> Option<Ivec2> {
    match key {
        Key::Up => Some(Ivec2::UP),
        Key::Down => Some(Ivec2::DOWN),
        Key::Left => Some(Ivec2::LEFT),
        Key::Right => Some(Ivec2::RIGHT),
        Key::Use | Key::Escape => None,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::content::MemoryResources;

    pub(crate) const PLAYER_JSON: &str = r#"{
        "speed": 4.0,
        "sprite": {
            "sheet": "hero.png",
            "tile_width": 16,
            "tile_height": 24,
            "columns": 4,
            "rows": 2,
            "phases": {
                "stance": { "frames": [0] },
                "down": { "frames": [0] },
                "up": { "frames": [1] },
                "left": { "frames": [2] },
                "right": { "frames": [3] },
                "moving-right": { "frames": [4, 5], "fps": 8 }
            }
        }
    }"#;

    /// A 4x3 town with a door at (3, 1) leading into a 2x2 house.
    pub(crate) const TOWN_JSON: &str = r#"{
        "width": 4, "height": 3, "tilewidth": 16, "tileheight": 16,
        "properties": { "name": "Town", "music": "town.ogg" },
        "tilesets": [
            { "firstgid": 1, "image": "tiles.png", "imagewidth": 32, "imageheight": 16,
              "tilewidth": 16, "tileheight": 16 }
        ],
        "layers": [
            { "type": "tilelayer", "name": "ground", "properties": { "depth": 0 },
              "data": [1,1,1,1, 1,1,1,1, 1,1,1,1] },
            { "type": "objectgroup", "name": "doors", "properties": { "depth": 1 },
              "objects": [
                { "x": 48, "y": 16, "width": 16, "height": 16,
                  "properties": { "exit": "house.json,0,1,0" } }
              ] }
        ]
    }"#;

    pub(crate) const HOUSE_JSON: &str = r#"{
        "width": 2, "height": 2, "tilewidth": 16, "tileheight": 16,
        "properties": { "name": "House" },
        "tilesets": [
            { "firstgid": 1, "image": "tiles.png", "imagewidth": 32, "imageheight": 16,
              "tilewidth": 16, "tileheight": 16 }
        ],
        "layers": [
            { "type": "tilelayer", "properties": { "depth": 0 }, "data": [2,2, 2,2] }
        ]
    }"#;

    pub(crate) const WORLD_JSON: &str = r#"{
        "name": "Demo",
        "move_mode": "tile",
        "viewport": { "width": 64, "height": 48 },
        "start": { "area": "town.json", "x": 1, "y": 1, "z": 1 },
        "player": { "descriptor": "player.json", "phase": "down" }
    }"#;

    pub(crate) fn resources() -> MemoryResources {
        MemoryResources::new()
            .with("world.json", WORLD_JSON)
            .with("player.json", PLAYER_JSON)
            .with("town.json", TOWN_JSON)
            .with("house.json", HOUSE_JSON)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{resources, HOUSE_JSON};
    use super::*;
    use crate::backend::{Backends, RecordingScripts};
    use crate::tiles::coords::Icoord;

    fn world() -> World {
        World::load(Backends::headless(resources())).expect("world")
    }

    fn press(key: Key) -> KeyEvent {
        KeyEvent { key, pressed: true }
    }

    fn release(key: Key) -> KeyEvent {
        KeyEvent {
            key,
            pressed: false,
        }
    }

    #[test]
    fn starts_in_the_configured_area() {
        let w = world();
        let area = w.focused_area().expect("focused");
        assert_eq!(area.descriptor(), "town.json");
        assert_eq!(area.name(), "Town");
        assert_eq!(w.player().character().tile(), Icoord::new(1, 1, 1));
        assert_eq!(area.grid().occupant(Icoord::new(1, 1, 1)), Some(crate::tiles::PLAYER_ID));
    }

    #[test]
    fn nested_pause_needs_matching_unpauses() {
        let mut w = world();
        w.tick(Duration::from_millis(10)).expect("tick");
        w.set_paused(true);
        w.set_paused(true);
        w.set_paused(false);
        w.tick(Duration::from_millis(500)).expect("tick");
        assert!(w.is_paused());
        assert_eq!(w.time(), Duration::from_millis(10));

        w.set_paused(false);
        assert!(!w.is_paused());
        w.tick(Duration::from_millis(5)).expect("tick");
        assert_eq!(w.time(), Duration::from_millis(15));
    }

    #[test]
    fn paused_world_ignores_movement_keys() {
        let mut w = world();
        w.set_paused(true);
        w.handle_key(press(Key::Right)).expect("key");
        w.set_paused(false);
        w.tick(Duration::from_secs(1)).expect("tick");
        assert_eq!(w.player().character().tile(), Icoord::new(1, 1, 1));
    }

    #[test]
    fn walking_through_a_door_focuses_the_next_area() {
        let mut w = world();
        w.handle_key(press(Key::Right)).expect("key");
        // arrives on (2, 1) and keeps walking toward the door
        w.tick(Duration::from_millis(250)).expect("tick");
        assert_eq!(w.player().character().tile(), Icoord::new(3, 1, 1));
        assert_eq!(w.focused_area().expect("town").descriptor(), "town.json");

        w.tick(Duration::from_millis(250)).expect("tick");
        w.handle_key(release(Key::Right)).expect("key");
        let area = w.focused_area().expect("focused");
        assert_eq!(area.descriptor(), "house.json");
        assert_eq!(w.player().character().tile(), Icoord::new(0, 1, 0));
        assert_eq!(area.grid().occupant(Icoord::new(0, 1, 0)), Some(crate::tiles::PLAYER_ID));

        let town = w.area("town.json").expect("cached");
        assert_eq!(town.grid().occupant(Icoord::new(3, 1, 1)), None);
    }

    #[test]
    fn refocusing_reuses_the_cached_area() {
        let mut w = world();
        w.spawn_npc("player.json", Vicoord::new(0, 0, 0.0), "down")
            .expect("spawn");
        w.focus_area("house.json", Vicoord::new(0, 0, 0.0)).expect("house");
        w.focus_area("town.json", Vicoord::new(2, 2, 0.0)).expect("town");
        assert_eq!(w.focused_area().expect("town").characters().len(), 1);
    }

    #[test]
    fn failed_load_keeps_current_focus() {
        let mut w = world();
        let err = w
            .focus_area("missing.json", Vicoord::new(0, 0, 0.0))
            .expect_err("missing");
        assert!(matches!(err, WorldError::AreaLoad(_)));
        assert_eq!(w.focused_area().expect("town").descriptor(), "town.json");
    }

    #[test]
    fn unknown_depth_is_rejected_before_leaving() {
        let mut w = world();
        let err = w
            .focus_area("house.json", Vicoord::new(0, 0, 9.0))
            .expect_err("depth");
        assert!(matches!(err, WorldError::Placement(PlacementError::UnknownDepth { .. })));
        assert_eq!(w.focused_area().expect("town").descriptor(), "town.json");
    }

    #[test]
    fn load_hook_survives_a_rejected_first_focus() {
        let house = HOUSE_JSON.replace(
            r#""properties": { "name": "House" }"#,
            r#""properties": { "name": "House", "on_load": "house_load.lua" }"#,
        );
        let scripts = RecordingScripts::default();
        let resources = resources()
            .with("house.json", &house)
            .with("house_load.lua", "-- load");
        let mut w = World::load(Backends::headless(resources).with_scripts(scripts.clone()))
            .expect("world");

        w.focus_area("house.json", Vicoord::new(0, 0, 9.0))
            .expect_err("depth");
        assert!(scripts.calls_to("house_load.lua").is_empty());

        w.focus_area("house.json", Vicoord::new(0, 0, 0.0)).expect("house");
        w.focus_area("town.json", Vicoord::new(2, 2, 0.0)).expect("town");
        w.focus_area("house.json", Vicoord::new(0, 0, 0.0)).expect("house again");
        let calls = scripts.calls_to("house_load.lua");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].hook, HookKind::Load);
    }

    #[test]
    fn escape_requests_quit() {
        let mut w = world();
        assert!(!w.quit_requested());
        w.handle_key(press(Key::Escape)).expect("key");
        assert!(w.quit_requested());
    }

    #[test]
    fn draw_then_present_reaches_the_image_backend() {
        let mut w = world();
        let mut display = DisplayList::default();
        assert!(w.needs_redraw());
        w.draw(&mut display);
        w.present(&mut display);
        assert!(!display.items().is_empty());
        assert!(!w.needs_redraw());
    }
}
