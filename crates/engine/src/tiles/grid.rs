use std::collections::HashMap;

use bitflags::bitflags;

use crate::backend::ScriptRef;

use super::coords::{DepthTable, DuplicateDepth, Icoord, Ivec2, TileSize};
use super::entity::EntityId;
use super::tileset::TileTypeIndex;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TileFlags: u32 {
        const NOWALK = 1 << 0;
        const NOWALK_PLAYER = 1 << 1;
        const NOWALK_NPC = 1 << 2;
        const NOWALK_EXIT = 1 << 3;
        const NOWALK_AREA_BOUND = 1 << 4;
    }
}

impl TileFlags {
    pub fn from_flag_name(name: &str) -> Option<Self> {
        match name {
            "nowalk" => Some(Self::NOWALK),
            "nowalk_player" => Some(Self::NOWALK_PLAYER),
            "nowalk_npc" => Some(Self::NOWALK_NPC),
            "nowalk_exit" => Some(Self::NOWALK_EXIT),
            "nowalk_area_bound" => Some(Self::NOWALK_AREA_BOUND),
            _ => None,
        }
    }
}

/// Exit and layermod slots. `Normal` applies to arriving on a tile; the
/// others to leaving it in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitDir {
    Normal,
    Up,
    Down,
    Left,
    Right,
}

impl ExitDir {
    pub const COUNT: usize = 5;

    pub const fn index(self) -> usize {
        match self {
            ExitDir::Normal => 0,
            ExitDir::Up => 1,
            ExitDir::Down => 2,
            ExitDir::Left => 3,
            ExitDir::Right => 4,
        }
    }

    /// `None` for anything but the four unit cardinals and the zero vector.
    pub fn from_facing(facing: Ivec2) -> Option<Self> {
        match (facing.x, facing.y) {
            (0, 0) => Some(ExitDir::Normal),
            (0, -1) => Some(ExitDir::Up),
            (0, 1) => Some(ExitDir::Down),
            (-1, 0) => Some(ExitDir::Left),
            (1, 0) => Some(ExitDir::Right),
            _ => None,
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "up" => Some(ExitDir::Up),
            "down" => Some(ExitDir::Down),
            "left" => Some(ExitDir::Left),
            "right" => Some(ExitDir::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Enter,
    Leave,
    Use,
}

impl TriggerKind {
    pub const COUNT: usize = 3;

    pub const fn index(self) -> usize {
        match self {
            TriggerKind::Enter => 0,
            TriggerKind::Leave => 1,
            TriggerKind::Use => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exit {
    pub area: String,
    pub coords: super::coords::Vicoord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Tiles,
    Objects,
}

/// Dense grid of tile-type indices with sparse per-coordinate overlays.
///
/// Overlay lookups and tile reads wrap looping axes first, so coordinates
/// reported in bounds by [`TileGrid::in_bounds`] are always safe to query.
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: i32,
    height: i32,
    tile_size: TileSize,
    graphics: Vec<TileTypeIndex>,
    depths: DepthTable,
    layer_kinds: Vec<LayerKind>,
    flags: HashMap<Icoord, TileFlags>,
    exits: [HashMap<Icoord, Exit>; ExitDir::COUNT],
    layermods: [HashMap<Icoord, f32>; ExitDir::COUNT],
    occupied: HashMap<Icoord, EntityId>,
    scripts: [HashMap<Icoord, ScriptRef>; TriggerKind::COUNT],
    loop_x: bool,
    loop_y: bool,
}

impl TileGrid {
    /// A grid with no layers yet; see [`TileGrid::add_layer`].
    pub fn new(width: u32, height: u32, tile_size: TileSize) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            tile_size,
            graphics: Vec::new(),
            depths: DepthTable::new(),
            layer_kinds: Vec::new(),
            flags: HashMap::new(),
            exits: Default::default(),
            layermods: Default::default(),
            occupied: HashMap::new(),
            scripts: Default::default(),
            loop_x: false,
            loop_y: false,
        }
    }

    /// Appends an empty layer at `depth` and returns its physical index.
    pub fn add_layer(&mut self, depth: f32, kind: LayerKind) -> Result<i32, DuplicateDepth> {
        let index = self.depths.push_layer(depth)?;
        self.layer_kinds.push(kind);
        let cells = self.width as usize * self.height as usize;
        self.graphics.resize(self.graphics.len() + cells, 0);
        Ok(index)
    }

    pub fn dim(&self) -> Icoord {
        Icoord::new(self.width, self.height, self.depths.layer_count())
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    pub fn depths(&self) -> &DepthTable {
        &self.depths
    }

    pub fn layer_kind(&self, z: i32) -> Option<LayerKind> {
        usize::try_from(z)
            .ok()
            .and_then(|idx| self.layer_kinds.get(idx).copied())
    }

    pub fn set_looping(&mut self, loop_x: bool, loop_y: bool) {
        self.loop_x = loop_x;
        self.loop_y = loop_y;
    }

    pub fn loops_x(&self) -> bool {
        self.loop_x
    }

    pub fn loops_y(&self) -> bool {
        self.loop_y
    }

    pub fn in_bounds(&self, phys: Icoord) -> bool {
        (self.loop_x || (0..self.width).contains(&phys.x))
            && (self.loop_y || (0..self.height).contains(&phys.y))
            && (0..self.depths.layer_count()).contains(&phys.z)
    }

    /// Folds looping axes back into `[0, dim)`. Other axes pass through.
    pub fn wrap(&self, phys: Icoord) -> Icoord {
        Icoord {
            x: if self.loop_x && self.width > 0 {
                phys.x.rem_euclid(self.width)
            } else {
                phys.x
            },
            y: if self.loop_y && self.height > 0 {
                phys.y.rem_euclid(self.height)
            } else {
                phys.y
            },
            z: phys.z,
        }
    }

    fn index_of(&self, phys: Icoord) -> usize {
        debug_assert!(self.in_bounds(phys), "grid access out of bounds: {phys:?}");
        let c = self.wrap(phys);
        ((c.z * self.height + c.y) * self.width + c.x) as usize
    }

    /// Callers check [`TileGrid::in_bounds`] first.
    pub fn tile_type(&self, phys: Icoord) -> TileTypeIndex {
        self.graphics[self.index_of(phys)]
    }

    pub fn set_tile_type(&mut self, phys: Icoord, tile_type: TileTypeIndex) {
        let index = self.index_of(phys);
        self.graphics[index] = tile_type;
    }

    pub fn flags(&self, phys: Icoord) -> TileFlags {
        self.flags
            .get(&self.wrap(phys))
            .copied()
            .unwrap_or_default()
    }

    pub fn add_flags(&mut self, phys: Icoord, flags: TileFlags) {
        let key = self.wrap(phys);
        *self.flags.entry(key).or_default() |= flags;
    }

    pub fn exit(&self, phys: Icoord, dir: ExitDir) -> Option<&Exit> {
        self.exits[dir.index()].get(&self.wrap(phys))
    }

    pub fn set_exit(&mut self, phys: Icoord, dir: ExitDir, exit: Exit) {
        let key = self.wrap(phys);
        self.exits[dir.index()].insert(key, exit);
    }

    /// The exit taken by leaving `from` along `facing`. Diagonals have none.
    pub fn exit_at(&self, from: Icoord, facing: Ivec2) -> Option<&Exit> {
        ExitDir::from_facing(facing).and_then(|dir| self.exit(from, dir))
    }

    pub fn layermod(&self, phys: Icoord, dir: ExitDir) -> Option<f32> {
        self.layermods[dir.index()].get(&self.wrap(phys)).copied()
    }

    pub fn set_layermod(&mut self, phys: Icoord, dir: ExitDir, depth: f32) {
        let key = self.wrap(phys);
        self.layermods[dir.index()].insert(key, depth);
    }

    pub fn layermod_at(&self, from: Icoord, facing: Ivec2) -> Option<f32> {
        ExitDir::from_facing(facing).and_then(|dir| self.layermod(from, dir))
    }

    /// Neighbor of `from` along `facing`, moved to another layer if `from`
    /// carries a layermod for that direction. Looping axes are not wrapped.
    ///
    /// Panics on a non-cardinal facing.
    pub fn move_dest(&self, from: Icoord, facing: Ivec2) -> Icoord {
        let Some(dir) = ExitDir::from_facing(facing) else {
            panic!("move_dest: facing {facing:?} is not a cardinal direction");
        };
        let mut dest = from + facing;
        if let Some(depth) = self.layermod(from, dir) {
            dest.z = self.depths.layer(depth);
        }
        dest
    }

    pub fn occupant(&self, phys: Icoord) -> Option<EntityId> {
        self.occupied.get(&self.wrap(phys)).copied()
    }

    pub fn occupy(&mut self, phys: Icoord, entity: EntityId) {
        let key = self.wrap(phys);
        self.occupied.insert(key, entity);
    }

    /// Clears `phys` only if `entity` is the one recorded there.
    pub fn vacate(&mut self, phys: Icoord, entity: EntityId) {
        let key = self.wrap(phys);
        if self.occupied.get(&key) == Some(&entity) {
            self.occupied.remove(&key);
        }
    }

    pub fn script(&self, phys: Icoord, trigger: TriggerKind) -> Option<&ScriptRef> {
        self.scripts[trigger.index()].get(&self.wrap(phys))
    }

    pub fn set_script(&mut self, phys: Icoord, trigger: TriggerKind, script: ScriptRef) {
        let key = self.wrap(phys);
        self.scripts[trigger.index()].insert(key, script);
    }
}

#[cfg(test)]
mod tests {
    use super::super::coords::Vicoord;
    use super::*;

    fn grid(width: u32, height: u32, layers: &[f32]) -> TileGrid {
        let mut grid = TileGrid::new(width, height, TileSize::new(16, 16));
        for &depth in layers {
            grid.add_layer(depth, LayerKind::Tiles).expect("layer");
        }
        grid
    }

    #[test]
    fn bounds_respect_looping_axes_but_never_z() {
        let mut g = grid(5, 5, &[0.0, 1.0]);
        g.set_looping(true, false);

        assert!(g.in_bounds(Icoord::new(-1, 0, 0)));
        assert!(!g.in_bounds(Icoord::new(0, 5, 0)));
        assert!(!g.in_bounds(Icoord::new(0, 0, 2)));
        assert!(!g.in_bounds(Icoord::new(0, -1, 0)));
    }

    #[test]
    fn tile_types_are_laid_out_per_layer() {
        let mut g = grid(3, 2, &[0.0, 0.5]);
        g.set_tile_type(Icoord::new(2, 1, 1), 7);
        g.set_tile_type(Icoord::new(0, 0, 0), 3);

        assert_eq!(g.tile_type(Icoord::new(2, 1, 1)), 7);
        assert_eq!(g.tile_type(Icoord::new(0, 0, 0)), 3);
        assert_eq!(g.tile_type(Icoord::new(2, 1, 0)), 0);
        assert_eq!(g.graphics[(2 + 1) * 3 + 2], 7);
    }

    #[test]
    fn looping_reads_wrap_to_the_same_cell() {
        let mut g = grid(4, 4, &[0.0]);
        g.set_looping(true, true);
        g.set_tile_type(Icoord::new(3, 0, 0), 9);
        g.add_flags(Icoord::new(0, 3, 0), TileFlags::NOWALK);

        assert_eq!(g.tile_type(Icoord::new(-1, 0, 0)), 9);
        assert_eq!(g.tile_type(Icoord::new(7, 4, 0)), 9);
        assert_eq!(g.flags(Icoord::new(4, -1, 0)), TileFlags::NOWALK);
    }

    #[test]
    fn absent_overlays_have_defaults() {
        let g = grid(2, 2, &[0.0]);
        let c = Icoord::new(1, 1, 0);
        assert!(g.flags(c).is_empty());
        assert!(g.exit(c, ExitDir::Normal).is_none());
        assert!(g.layermod(c, ExitDir::Up).is_none());
        assert!(g.occupant(c).is_none());
        assert!(g.script(c, TriggerKind::Enter).is_none());
    }

    #[test]
    fn direction_slots_follow_facing() {
        assert_eq!(ExitDir::from_facing(Ivec2::ZERO), Some(ExitDir::Normal));
        assert_eq!(ExitDir::from_facing(Ivec2::UP), Some(ExitDir::Up));
        assert_eq!(ExitDir::from_facing(Ivec2::LEFT), Some(ExitDir::Left));
        assert_eq!(ExitDir::from_facing(Ivec2::new(1, 1)), None);
        assert_eq!(ExitDir::from_facing(Ivec2::new(0, 2)), None);
    }

    #[test]
    fn exit_lookups_use_the_direction_slot() {
        let mut g = grid(3, 3, &[0.0]);
        let from = Icoord::new(1, 1, 0);
        let exit = Exit {
            area: "b.json".to_string(),
            coords: Vicoord::new(4, 4, 0.0),
        };
        g.set_exit(from, ExitDir::Right, exit.clone());

        assert_eq!(g.exit_at(from, Ivec2::RIGHT), Some(&exit));
        assert_eq!(g.exit_at(from, Ivec2::LEFT), None);
        assert_eq!(g.exit_at(from, Ivec2::new(1, 1)), None);
    }

    #[test]
    fn move_dest_applies_directional_layermod() {
        let mut g = grid(4, 4, &[0.0, 0.5, 1.0]);
        let from = Icoord::new(1, 1, 0);
        g.set_layermod(from, ExitDir::Up, 1.0);

        assert_eq!(g.move_dest(from, Ivec2::UP), Icoord::new(1, 0, 2));
        assert_eq!(g.move_dest(from, Ivec2::DOWN), Icoord::new(1, 2, 0));
        assert_eq!(g.layermod_at(from, Ivec2::UP), Some(1.0));
        assert_eq!(g.layermod_at(from, Ivec2::new(-1, 1)), None);
    }

    #[test]
    #[should_panic(expected = "not a cardinal")]
    fn move_dest_rejects_diagonals() {
        let g = grid(2, 2, &[0.0]);
        let _ = g.move_dest(Icoord::new(0, 0, 0), Ivec2::new(1, 1));
    }

    #[test]
    fn vacate_only_clears_own_occupancy() {
        let mut g = grid(2, 2, &[0.0]);
        let c = Icoord::new(0, 1, 0);
        g.occupy(c, EntityId(3));
        g.vacate(c, EntityId(4));
        assert_eq!(g.occupant(c), Some(EntityId(3)));
        g.vacate(c, EntityId(3));
        assert_eq!(g.occupant(c), None);
    }

    #[test]
    fn duplicate_layer_depth_is_rejected() {
        let mut g = grid(2, 2, &[0.0]);
        assert!(g.add_layer(0.0, LayerKind::Objects).is_err());
        assert_eq!(g.dim(), Icoord::new(2, 2, 1));
    }

    #[test]
    fn flag_names_resolve_to_disjoint_bits() {
        let all = [
            "nowalk",
            "nowalk_player",
            "nowalk_npc",
            "nowalk_exit",
            "nowalk_area_bound",
        ];
        let mut seen = TileFlags::empty();
        for name in all {
            let flag = TileFlags::from_flag_name(name).expect("flag");
            assert!(!seen.intersects(flag), "{name} overlaps");
            seen |= flag;
        }
        assert!(TileFlags::from_flag_name("bogus").is_none());
        assert_eq!(TileFlags::from_name("NOWALK_EXIT"), Some(TileFlags::NOWALK_EXIT));
    }
}
