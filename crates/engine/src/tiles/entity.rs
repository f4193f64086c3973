use std::collections::HashMap;

use crate::app::{DisplayList, DrawItem};
use crate::backend::{ImageHandle, ScriptRef, SoundHandle};

use super::animation::{Animation, TimeMs};
use super::coords::{Ivec2, PixelRect, Rcoord, TileSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

pub const PLAYER_ID: EntityId = EntityId(0);

#[derive(Debug)]
pub struct EntityIdAllocator {
    next: u64,
}

impl Default for EntityIdAllocator {
    fn default() -> Self {
        Self {
            next: PLAYER_ID.0 + 1,
        }
    }
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveState {
    Standing,
    Moving { dest: Rcoord, angle: f32 },
}

pub const STANCE_PHASE: &str = "stance";

pub fn facing_phase(facing: Ivec2) -> &'static str {
    match (facing.x, facing.y) {
        (0, -1) => "up",
        (0, 1) => "down",
        (-1, 0) => "left",
        (1, 0) => "right",
        _ => STANCE_PHASE,
    }
}

pub fn moving_phase(facing: Ivec2) -> &'static str {
    match (facing.x, facing.y) {
        (0, -1) => "moving-up",
        (0, 1) => "moving-down",
        (-1, 0) => "moving-left",
        (1, 0) => "moving-right",
        _ => STANCE_PHASE,
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityHooks {
    pub on_tick: Option<ScriptRef>,
    pub on_turn: Option<ScriptRef>,
    pub on_use: Option<ScriptRef>,
}

/// Everything an entity needs from its descriptor. Animations here are
/// templates; each entity detaches its own copies.
#[derive(Debug, Clone)]
pub struct EntitySprite {
    pub phases: HashMap<String, Animation>,
    pub size: (u32, u32),
    pub speed: f32,
    pub step_sound: Option<SoundHandle>,
    pub hooks: EntityHooks,
}

/// State shared by characters, overlays and the player: pixel position,
/// facing, phase animation and the tile-stepping movement state.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    descriptor: String,
    r: Rcoord,
    facing: Ivec2,
    phase: String,
    phases: HashMap<String, Animation>,
    current: Option<Animation>,
    sprite_size: (u32, u32),
    state: MoveState,
    speed: f32,
    frozen: bool,
    dead: bool,
    redraw: bool,
    step_sound: Option<SoundHandle>,
    hooks: EntityHooks,
}

impl Entity {
    pub fn new(id: EntityId, descriptor: &str, sprite: &EntitySprite) -> Self {
        let phases = sprite
            .phases
            .iter()
            .map(|(name, anim)| (name.clone(), anim.detached()))
            .collect::<HashMap<_, _>>();
        let current = phases.get(STANCE_PHASE).cloned();
        Self {
            id,
            descriptor: descriptor.to_string(),
            r: Rcoord::default(),
            facing: Ivec2::DOWN,
            phase: STANCE_PHASE.to_string(),
            phases,
            current,
            sprite_size: sprite.size,
            state: MoveState::Standing,
            speed: sprite.speed,
            frozen: false,
            dead: false,
            redraw: true,
            step_sound: sprite.step_sound,
            hooks: sprite.hooks.clone(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn pixel(&self) -> Rcoord {
        self.r
    }

    pub fn set_pixel(&mut self, r: Rcoord) {
        self.r = r;
        self.redraw = true;
    }

    pub fn facing(&self) -> Ivec2 {
        self.facing
    }

    pub fn set_facing(&mut self, facing: Ivec2) {
        if self.facing != facing {
            self.facing = facing;
            self.redraw = true;
        }
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Switches phase and restarts its animation. Unknown phases fall back to
    /// the stance animation. Returns false if `name` was already current.
    pub fn set_phase(&mut self, name: &str, now: TimeMs) -> bool {
        if self.phase == name {
            return false;
        }
        self.phase = name.to_string();
        let next = self
            .phases
            .get(name)
            .or_else(|| self.phases.get(STANCE_PHASE))
            .cloned();
        if let Some(anim) = &next {
            anim.restart(now);
        }
        self.current = next;
        self.redraw = true;
        true
    }

    pub fn move_state(&self) -> MoveState {
        self.state
    }

    pub fn is_moving(&self) -> bool {
        matches!(self.state, MoveState::Moving { .. })
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, tiles_per_second: f32) {
        self.speed = tiles_per_second;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Marks the entity for removal at the end of the current tick.
    pub fn destroy(&mut self) {
        self.dead = true;
        self.redraw = true;
    }

    pub fn step_sound(&self) -> Option<SoundHandle> {
        self.step_sound
    }

    pub fn hooks(&self) -> &EntityHooks {
        &self.hooks
    }

    pub fn sprite_size(&self) -> (u32, u32) {
        self.sprite_size
    }

    pub fn request_redraw(&mut self) {
        self.redraw = true;
    }

    /// Screen-space box of the sprite: centered horizontally on its tile and
    /// resting on the tile's bottom edge.
    pub fn render_rect(&self, tile: TileSize) -> PixelRect {
        let (w, h) = self.sprite_size;
        PixelRect {
            x: self.r.x + (tile.width as f32 - w as f32) / 2.0,
            y: self.r.y + tile.height as f32 - h as f32,
            width: w as f32,
            height: h as f32,
        }
    }

    pub fn needs_redraw(&self, now: TimeMs, tile: TileSize, visible: &PixelRect) -> bool {
        let changed = self.redraw
            || self
                .current
                .as_ref()
                .is_some_and(|anim| anim.needs_redraw(now));
        changed && self.render_rect(tile).intersects(visible)
    }

    pub fn current_image(&self, now: TimeMs) -> Option<ImageHandle> {
        self.current.as_ref().map(|anim| anim.set_frame(now))
    }

    pub fn draw(&mut self, now: TimeMs, tile: TileSize, display: &mut DisplayList) {
        self.redraw = false;
        let Some(image) = self.current_image(now) else {
            return;
        };
        let rect = self.render_rect(tile);
        display.push(DrawItem {
            image,
            x: rect.x,
            y: rect.y,
            depth: self.r.z,
        });
    }

    pub(crate) fn begin_move(&mut self, dest: Rcoord) {
        let angle = (dest.y - self.r.y).atan2(dest.x - self.r.x);
        self.state = MoveState::Moving { dest, angle };
        self.redraw = true;
    }

    /// Interpolates toward the destination at `speed * tile_width` px/s.
    /// Returns the unused part of `dt` once the destination is reached.
    pub(crate) fn advance(&mut self, dt_seconds: f32, tile_width: u32) -> Option<f32> {
        let MoveState::Moving { dest, angle } = self.state else {
            return None;
        };
        let travel = self.speed * tile_width as f32 * dt_seconds;
        let remaining = self.r.distance_xy(dest);
        self.redraw = true;

        if travel >= remaining {
            self.r = dest;
            self.state = MoveState::Standing;
            let leftover = if travel > 0.0 {
                dt_seconds * (1.0 - remaining / travel)
            } else {
                0.0
            };
            return Some(leftover.max(0.0));
        }

        self.r.x += angle.cos() * travel;
        self.r.y += angle.sin() * travel;
        None
    }

    pub(crate) fn stop(&mut self) {
        self.state = MoveState::Standing;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sprite;
    use super::*;

    #[test]
    fn allocator_starts_after_player_and_never_reuses() {
        let mut ids = EntityIdAllocator::default();
        let a = ids.allocate();
        let b = ids.allocate();
        assert_ne!(a, PLAYER_ID);
        assert_eq!(b.0, a.0 + 1);
    }

    #[test]
    fn advance_interpolates_then_snaps_with_leftover() {
        let mut e = Entity::new(EntityId(1), "npc.json", &sprite(2.0));
        e.set_pixel(Rcoord::new(0.0, 0.0, 0.0));
        e.begin_move(Rcoord::new(16.0, 0.0, 0.0));

        // 2 tiles/s * 16 px = 32 px/s
        assert_eq!(e.advance(0.25, 16), None);
        assert!((e.pixel().x - 8.0).abs() < 0.001);
        assert!(e.is_moving());

        let leftover = e.advance(0.5, 16).expect("arrived");
        assert_eq!(e.pixel(), Rcoord::new(16.0, 0.0, 0.0));
        assert!(!e.is_moving());
        assert!((leftover - 0.25).abs() < 0.001);
    }

    #[test]
    fn advance_moves_along_angle() {
        let mut e = Entity::new(EntityId(1), "npc.json", &sprite(1.0));
        e.set_pixel(Rcoord::new(32.0, 32.0, 0.0));
        e.begin_move(Rcoord::new(32.0, 16.0, 0.0));
        assert_eq!(e.advance(0.5, 16), None);
        assert!((e.pixel().y - 24.0).abs() < 0.001);
        assert!((e.pixel().x - 32.0).abs() < 0.001);
    }

    #[test]
    fn unknown_phase_falls_back_to_stance() {
        let mut e = Entity::new(EntityId(1), "npc.json", &sprite(1.0));
        assert!(e.set_phase("dance", 0));
        assert_eq!(e.phase(), "dance");
        assert_eq!(e.current_image(0), Some(ImageHandle(100)));
        assert!(!e.set_phase("dance", 10));
    }

    #[test]
    fn render_rect_centers_and_bottom_aligns() {
        let mut e = Entity::new(EntityId(1), "npc.json", &sprite(1.0));
        e.set_pixel(Rcoord::new(32.0, 48.0, 0.0));
        let rect = e.render_rect(TileSize::new(32, 32));
        assert_eq!(rect.x, 40.0);
        assert_eq!(rect.y, 56.0);
    }

    #[test]
    fn drawing_clears_redraw_until_something_changes() {
        let mut e = Entity::new(EntityId(1), "npc.json", &sprite(1.0));
        let tile = TileSize::new(16, 16);
        let visible = PixelRect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        assert!(e.needs_redraw(0, tile, &visible));
        let mut display = DisplayList::default();
        e.draw(0, tile, &mut display);
        assert_eq!(display.items().len(), 1);
        assert!(!e.needs_redraw(5_000, tile, &visible));

        e.set_facing(Ivec2::LEFT);
        assert!(e.needs_redraw(5_000, tile, &visible));
    }

    #[test]
    fn off_screen_changes_do_not_need_redraw() {
        let mut e = Entity::new(EntityId(1), "npc.json", &sprite(1.0));
        e.set_pixel(Rcoord::new(500.0, 500.0, 0.0));
        let visible = PixelRect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        assert!(!e.needs_redraw(0, TileSize::new(16, 16), &visible));
    }
}
