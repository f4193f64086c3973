use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::app::Color;
use crate::backend::{Backends, TiledImageHandle};
use crate::tiles::{
    Animation, Area, AreaHooks, AreaProperties, Exit, ExitDir, Icoord, LayerKind, TileFlags,
    TileGrid, TileSet, TileSize, TileType, TileTypes, TimeMs, TriggerKind, Vicoord,
};

use super::resources::{parse_json, ResourceError};
use super::scripts::load_script;

/// Animated tiles without an explicit `speed` show one frame per second.
const DEFAULT_TILE_FPS: f64 = 1.0;
const MAX_LAYER_CELLS: u64 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaErrorCode {
    Resource,
    MissingField,
    InvalidValue,
    DuplicateDepth,
    DimensionMismatch,
    TileIdOutOfRange,
    UnsortedTiles,
    MalformedExit,
    MalformedColor,
    UnknownFlag,
}

/// Why an area failed to load. The first problem found aborts the load.
#[derive(Debug, Clone)]
pub struct AreaLoadError {
    pub code: AreaErrorCode,
    pub message: String,
    pub descriptor: String,
}

impl fmt::Display for AreaLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {} (area={})", self.code, self.message, self.descriptor)
    }
}

impl std::error::Error for AreaLoadError {}

#[derive(Debug, Default, Deserialize)]
#[serde(from = "RawProperties")]
struct Properties(BTreeMap<String, Value>);

/// Properties may be written as a plain object or as a list of
/// `{ "name": ..., "value": ... }` pairs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawProperties {
    Map(BTreeMap<String, Value>),
    List(Vec<NamedProperty>),
}

#[derive(Debug, Deserialize)]
struct NamedProperty {
    name: String,
    value: Value,
}

impl From<RawProperties> for Properties {
    fn from(raw: RawProperties) -> Self {
        match raw {
            RawProperties::Map(map) => Self(map),
            RawProperties::List(list) => Self(list.into_iter().map(|p| (p.name, p.value)).collect()),
        }
    }
}

impl Properties {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(value_text)
    }
}

#[derive(Debug, Deserialize)]
struct AreaDoc {
    width: u32,
    height: u32,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    tilesets: Vec<TilesetDoc>,
    layers: Vec<LayerDoc>,
}

#[derive(Debug, Deserialize)]
struct TilesetDoc {
    firstgid: u32,
    image: String,
    imagewidth: u32,
    imageheight: u32,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default)]
    tiles: Vec<TileDoc>,
}

#[derive(Debug, Deserialize)]
struct TileDoc {
    id: u32,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LayerDoc {
    Tilelayer {
        #[serde(default)]
        name: String,
        #[serde(default)]
        properties: Properties,
        data: Vec<u32>,
    },
    Objectgroup {
        #[serde(default)]
        name: String,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        objects: Vec<ObjectDoc>,
    },
}

#[derive(Debug, Deserialize)]
struct ObjectDoc {
    x: f64,
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(default)]
    properties: Properties,
}

/// Loads and validates an area description, its tilesets and scripts.
pub fn load_area(descriptor: &str, backends: &mut Backends) -> Result<Area, AreaLoadError> {
    let result = AreaParser {
        descriptor,
        backends,
    }
    .parse();
    match &result {
        Ok(area) => {
            let dim = area.grid().dim();
            info!(
                area = descriptor,
                width = dim.x,
                height = dim.y,
                layers = dim.z,
                tile_types = area.types().len(),
                "area_loaded"
            );
        }
        Err(err) => {
            error!(
                area = descriptor,
                code = ?err.code,
                message = %err.message,
                "area_load_failed"
            );
        }
    }
    result
}

struct AreaParser<'a> {
    descriptor: &'a str,
    backends: &'a mut Backends,
}

impl AreaParser<'_> {
    fn error(&self, code: AreaErrorCode, message: String) -> AreaLoadError {
        AreaLoadError {
            code,
            message,
            descriptor: self.descriptor.to_string(),
        }
    }

    fn parse(mut self) -> Result<Area, AreaLoadError> {
        let bytes = self
            .backends
            .resources
            .load_bytes(self.descriptor)
            .map_err(|err| self.error(AreaErrorCode::Resource, err.to_string()))?;
        let doc: AreaDoc = parse_json(self.descriptor, &bytes).map_err(|err| self.doc_error(err))?;

        if doc.width == 0 || doc.height == 0 || doc.tilewidth == 0 || doc.tileheight == 0 {
            return Err(self.error(
                AreaErrorCode::InvalidValue,
                format!(
                    "area and tile sizes must be non-zero, got {}x{} tiles of {}x{} px",
                    doc.width, doc.height, doc.tilewidth, doc.tileheight
                ),
            ));
        }
        let cells = u64::from(doc.width) * u64::from(doc.height);
        let pixel_width = u64::from(doc.width) * u64::from(doc.tilewidth);
        let pixel_height = u64::from(doc.height) * u64::from(doc.tileheight);
        let pixel_limit = i32::MAX as u64;
        if cells > MAX_LAYER_CELLS || pixel_width > pixel_limit || pixel_height > pixel_limit {
            return Err(self.error(
                AreaErrorCode::InvalidValue,
                format!(
                    "area of {}x{} tiles of {}x{} px is too large",
                    doc.width, doc.height, doc.tilewidth, doc.tileheight
                ),
            ));
        }
        let tile = TileSize::new(doc.tilewidth, doc.tileheight);

        let mut types = TileTypes::new();
        let mut tilesets = BTreeMap::new();
        for set in &doc.tilesets {
            let tileset = self.parse_tileset(set, tile, &mut types)?;
            tilesets.insert(tileset.image.clone(), tileset);
        }

        let mut grid = TileGrid::new(doc.width, doc.height, tile);
        let mut object_groups = Vec::new();
        for layer in &doc.layers {
            match layer {
                LayerDoc::Tilelayer {
                    name,
                    properties,
                    data,
                } => {
                    let z = self.add_layer(&mut grid, name, properties, LayerKind::Tiles)?;
                    self.fill_layer(&mut grid, z, name, data, &types)?;
                }
                LayerDoc::Objectgroup {
                    name,
                    properties,
                    objects,
                } => {
                    let z = self.add_layer(&mut grid, name, properties, LayerKind::Objects)?;
                    object_groups.push((z, objects));
                }
            }
        }
        if grid.dim().z == 0 {
            return Err(self.error(AreaErrorCode::MissingField, "area has no layers".to_string()));
        }
        // Objects may point at layers declared after their own.
        for (z, objects) in object_groups {
            for object in objects {
                self.apply_object(&mut grid, z, object)?;
            }
        }

        let props = self.parse_properties(&doc.properties, &mut grid)?;
        Ok(Area::new(self.descriptor, props, grid, tilesets, types))
    }

    fn doc_error(&self, err: ResourceError) -> AreaLoadError {
        match err {
            ResourceError::Json { field, source, .. } => {
                let message = source.to_string();
                let code = if message.starts_with("missing field") {
                    AreaErrorCode::MissingField
                } else {
                    AreaErrorCode::InvalidValue
                };
                self.error(code, format!("at {field}: {message}"))
            }
            other => self.error(AreaErrorCode::Resource, other.to_string()),
        }
    }

    fn parse_tileset(
        &mut self,
        set: &TilesetDoc,
        tile: TileSize,
        types: &mut TileTypes,
    ) -> Result<TileSet, AreaLoadError> {
        if set.tilewidth != tile.width || set.tileheight != tile.height {
            return Err(self.error(
                AreaErrorCode::DimensionMismatch,
                format!(
                    "tileset '{}' uses {}x{} tiles but the area uses {}x{}",
                    set.image, set.tilewidth, set.tileheight, tile.width, tile.height
                ),
            ));
        }
        if set.firstgid != types.next_gid() {
            return Err(self.error(
                AreaErrorCode::UnsortedTiles,
                format!(
                    "tileset '{}' starts at gid {} but the next free gid is {}",
                    set.image,
                    set.firstgid,
                    types.next_gid()
                ),
            ));
        }
        let across = set.imagewidth / set.tilewidth;
        let high = set.imageheight / set.tileheight;
        if across == 0 || high == 0 {
            return Err(self.error(
                AreaErrorCode::DimensionMismatch,
                format!(
                    "tileset image '{}' ({}x{} px) holds no whole tile",
                    set.image, set.imagewidth, set.imageheight
                ),
            ));
        }
        let sheet = self
            .backends
            .images
            .load_tiled_image(&set.image, tile, across, high)
            .ok_or_else(|| {
                self.error(
                    AreaErrorCode::Resource,
                    format!("tileset image '{}' could not be loaded", set.image),
                )
            })?;
        let count = across * high;

        let mut previous: Option<u32> = None;
        for declared in &set.tiles {
            if previous.is_some_and(|prev| declared.id <= prev) {
                return Err(self.error(
                    AreaErrorCode::UnsortedTiles,
                    format!(
                        "tileset '{}' declares tile {} after tile {}",
                        set.image,
                        declared.id,
                        previous.unwrap_or_default()
                    ),
                ));
            }
            if declared.id >= count {
                return Err(self.error(
                    AreaErrorCode::TileIdOutOfRange,
                    format!(
                        "tileset '{}' declares tile {} but holds {count} tiles",
                        set.image, declared.id
                    ),
                ));
            }
            previous = Some(declared.id);
        }

        let mut declared = set.tiles.iter().peekable();
        for local in 0..count {
            let tile_type = match declared.next_if(|t| t.id == local) {
                Some(doc) => self.parse_tile_type(set, sheet, count, doc)?,
                None => TileType::new(TileFlags::empty(), Some(self.frame(set, sheet, local)?)),
            };
            types.push(tile_type);
        }
        debug!(
            area = self.descriptor,
            image = %set.image,
            first_gid = set.firstgid,
            tiles = count,
            declared = set.tiles.len(),
            "tileset_loaded"
        );

        Ok(TileSet {
            image: set.image.clone(),
            sheet,
            first_gid: set.firstgid,
            tile_size: tile,
            across,
            high,
        })
    }

    fn frame(&self, set: &TilesetDoc, sheet: TiledImageHandle, local: u32) -> Result<Animation, AreaLoadError> {
        let image = self.backends.images.image_at(sheet, local).ok_or_else(|| {
            self.error(
                AreaErrorCode::TileIdOutOfRange,
                format!("tileset '{}' has no frame {local}", set.image),
            )
        })?;
        Ok(Animation::single(image))
    }

    fn parse_tile_type(
        &mut self,
        set: &TilesetDoc,
        sheet: TiledImageHandle,
        count: u32,
        doc: &TileDoc,
    ) -> Result<TileType, AreaLoadError> {
        let props = &doc.properties;
        let flags = match props.text("flags") {
            Some(names) => self.parse_flags(&names)?,
            None => TileFlags::empty(),
        };

        let local_frames = match props.get("frames") {
            Some(value) => self.parse_frames(value, doc.id)?,
            None => vec![doc.id],
        };
        let mut frames = Vec::with_capacity(local_frames.len());
        for local in local_frames {
            let image = (local < count)
                .then(|| self.backends.images.image_at(sheet, local))
                .flatten()
                .ok_or_else(|| {
                    self.error(
                        AreaErrorCode::TileIdOutOfRange,
                        format!(
                            "tile {} of '{}' animates frame {local}, outside the tileset",
                            doc.id, set.image
                        ),
                    )
                })?;
            frames.push(image);
        }

        let fps = match props.get("speed") {
            Some(value) => value_f64(value)
                .filter(|fps| fps.is_finite() && *fps > 0.0)
                .ok_or_else(|| {
                    self.error(
                        AreaErrorCode::InvalidValue,
                        format!("tile {} of '{}' has invalid speed {value}", doc.id, set.image),
                    )
                })?,
            None => DEFAULT_TILE_FPS,
        };
        let frame_duration = (1000.0 / fps).round() as TimeMs;

        let mut tile_type = TileType::new(flags, Some(Animation::new(frames, frame_duration)));
        for (key, trigger) in [
            ("on_enter", TriggerKind::Enter),
            ("on_leave", TriggerKind::Leave),
            ("on_use", TriggerKind::Use),
        ] {
            if let Some(path) = props.text(key) {
                if let Some(script) = load_script(&path, self.descriptor, self.backends) {
                    tile_type.add_hook(trigger, script);
                }
            }
        }
        Ok(tile_type)
    }

    fn parse_frames(&self, value: &Value, id: u32) -> Result<Vec<u32>, AreaLoadError> {
        let invalid = || {
            self.error(
                AreaErrorCode::InvalidValue,
                format!("tile {id} has malformed frames {value}"),
            )
        };
        let frames: Vec<u32> = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|n| u32::try_from(n).ok()))
                .collect::<Option<_>>()
                .ok_or_else(invalid)?,
            Value::String(list) => list
                .split(',')
                .map(|part| part.trim().parse::<u32>().ok())
                .collect::<Option<_>>()
                .ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        if frames.is_empty() {
            return Err(invalid());
        }
        Ok(frames)
    }

    fn parse_flags(&self, names: &str) -> Result<TileFlags, AreaLoadError> {
        let mut flags = TileFlags::empty();
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            flags |= TileFlags::from_flag_name(name).ok_or_else(|| {
                self.error(AreaErrorCode::UnknownFlag, format!("unknown tile flag '{name}'"))
            })?;
        }
        Ok(flags)
    }

    fn add_layer(
        &self,
        grid: &mut TileGrid,
        name: &str,
        properties: &Properties,
        kind: LayerKind,
    ) -> Result<i32, AreaLoadError> {
        let value = properties.get("depth").ok_or_else(|| {
            self.error(
                AreaErrorCode::MissingField,
                format!("layer '{name}' has no depth property"),
            )
        })?;
        let depth = value_f64(value).filter(|d| d.is_finite()).ok_or_else(|| {
            self.error(
                AreaErrorCode::InvalidValue,
                format!("layer '{name}' has non-numeric depth {value}"),
            )
        })? as f32;
        grid.add_layer(depth, kind).map_err(|err| {
            self.error(
                AreaErrorCode::DuplicateDepth,
                format!("layer '{name}': {err}"),
            )
        })
    }

    fn fill_layer(
        &self,
        grid: &mut TileGrid,
        z: i32,
        name: &str,
        data: &[u32],
        types: &TileTypes,
    ) -> Result<(), AreaLoadError> {
        let dim = grid.dim();
        let expected = dim.x as usize * dim.y as usize;
        if data.len() != expected {
            return Err(self.error(
                AreaErrorCode::DimensionMismatch,
                format!(
                    "layer '{name}' has {} tiles, expected {}x{} = {expected}",
                    data.len(),
                    dim.x,
                    dim.y
                ),
            ));
        }
        for (index, &gid) in data.iter().enumerate() {
            if gid as usize >= types.len() {
                return Err(self.error(
                    AreaErrorCode::TileIdOutOfRange,
                    format!(
                        "layer '{name}' uses gid {gid} but only {} tile types exist",
                        types.len()
                    ),
                ));
            }
            let x = (index % dim.x as usize) as i32;
            let y = (index / dim.x as usize) as i32;
            grid.set_tile_type(Icoord::new(x, y, z), gid);
        }
        Ok(())
    }

    fn apply_object(&mut self, grid: &mut TileGrid, z: i32, object: &ObjectDoc) -> Result<(), AreaLoadError> {
        let tile = grid.tile_size();
        let dim = grid.dim();
        let (tw, th) = (tile.width as f64, tile.height as f64);
        let x1 = (object.x / tw).floor() as i32;
        let y1 = (object.y / th).floor() as i32;
        let x2 = ((object.x + object.width) / tw).ceil().max(f64::from(x1 + 1)) as i32;
        let y2 = ((object.y + object.height) / th).ceil().max(f64::from(y1 + 1)) as i32;
        if x1 < 0 || y1 < 0 || x2 > dim.x || y2 > dim.y {
            return Err(self.error(
                AreaErrorCode::InvalidValue,
                format!(
                    "object at ({}, {}) px covers tiles ({x1}, {y1})..({x2}, {y2}), outside the {}x{} area",
                    object.x, object.y, dim.x, dim.y
                ),
            ));
        }
        let cells = || (y1..y2).flat_map(move |y| (x1..x2).map(move |x| (x, y)));

        for (key, value) in &object.properties.0 {
            let (base, suffix) = match key.split_once(':') {
                Some((base, suffix)) => (base, Some(suffix)),
                None => (key.as_str(), None),
            };
            match base {
                "exit" | "layermod" => {
                    let dir = match suffix {
                        None => ExitDir::Normal,
                        Some(suffix) => ExitDir::from_suffix(suffix).ok_or_else(|| {
                            self.error(
                                AreaErrorCode::InvalidValue,
                                format!("unknown direction in object property '{key}'"),
                            )
                        })?,
                    };
                    let text = value_text(value).unwrap_or_default();
                    if base == "exit" {
                        let spec = parse_exit(&text).ok_or_else(|| {
                            self.error(
                                AreaErrorCode::MalformedExit,
                                format!("malformed exit '{text}', expected area,x,y,z"),
                            )
                        })?;
                        for (x, y) in cells() {
                            let phys = Icoord::new(x, y, z);
                            grid.set_exit(phys, dir, spec.exit_from(x - x1, y - y1, x2 - x1));
                            if dir == ExitDir::Normal {
                                grid.add_flags(phys, TileFlags::NOWALK_EXIT);
                            }
                        }
                    } else {
                        let depth = text
                            .trim()
                            .parse::<f32>()
                            .ok()
                            .filter(|d| grid.depths().layer_of(*d).is_some())
                            .ok_or_else(|| {
                                self.error(
                                    AreaErrorCode::InvalidValue,
                                    format!("layermod '{text}' is not the depth of any layer"),
                                )
                            })?;
                        for (x, y) in cells() {
                            grid.set_layermod(Icoord::new(x, y, z), dir, depth);
                        }
                    }
                }
                "flags" => {
                    let flags = self.parse_flags(&value_text(value).unwrap_or_default())?;
                    for (x, y) in cells() {
                        grid.add_flags(Icoord::new(x, y, z), flags);
                    }
                }
                "on_enter" | "on_leave" | "on_use" => {
                    let trigger = match base {
                        "on_enter" => TriggerKind::Enter,
                        "on_leave" => TriggerKind::Leave,
                        _ => TriggerKind::Use,
                    };
                    let Some(path) = value_text(value) else {
                        continue;
                    };
                    if let Some(script) = load_script(&path, self.descriptor, self.backends) {
                        for (x, y) in cells() {
                            grid.set_script(Icoord::new(x, y, z), trigger, script.clone());
                        }
                    }
                }
                _ => debug!(area = self.descriptor, property = %key, "object_property_ignored"),
            }
        }
        Ok(())
    }

    fn parse_properties(&mut self, doc: &Properties, grid: &mut TileGrid) -> Result<AreaProperties, AreaLoadError> {
        match doc.text("loop").as_deref() {
            None | Some("") => {}
            Some("x") => grid.set_looping(true, false),
            Some("y") => grid.set_looping(false, true),
            Some("xy") => grid.set_looping(true, true),
            Some(other) => {
                return Err(self.error(
                    AreaErrorCode::InvalidValue,
                    format!("loop must be x, y or xy, got '{other}'"),
                ))
            }
        }

        let color_overlay = match doc.text("color_overlay") {
            Some(text) => Some(parse_color(&text).ok_or_else(|| {
                self.error(
                    AreaErrorCode::MalformedColor,
                    format!("color_overlay '{text}' must be r,g,b,a with each in 0..=255"),
                )
            })?),
            None => None,
        };

        let mut hook = |key: &str| {
            doc.text(key)
                .and_then(|path| load_script(&path, self.descriptor, self.backends))
        };
        let hooks = AreaHooks {
            on_load: hook("on_load"),
            on_focus: hook("on_focus"),
            on_tick: hook("on_tick"),
            on_turn: hook("on_turn"),
        };

        Ok(AreaProperties {
            name: doc
                .text("name")
                .unwrap_or_else(|| self.descriptor.to_string()),
            music: doc.text("music").filter(|m| !m.is_empty()),
            color_overlay,
            hooks,
        })
    }
}

/// Target of an exit region. `+` after x or y spreads a wide region over
/// consecutive destination tiles along that axis. A trailing `+` on the
/// whole target (`area,x,y,z+`) spreads the region's tiles, in row order,
/// over consecutive destination rows.
#[derive(Debug, Clone, PartialEq)]
struct ExitSpec {
    area: String,
    x: i32,
    y: i32,
    z: f32,
    wide_x: bool,
    wide_y: bool,
    fan_rows: bool,
}

impl ExitSpec {
    fn exit_from(&self, dx: i32, dy: i32, region_width: i32) -> Exit {
        let fan = if self.fan_rows { dy * region_width + dx } else { 0 };
        Exit {
            area: self.area.clone(),
            coords: Vicoord::new(
                self.x + if self.wide_x { dx } else { 0 },
                self.y + if self.wide_y { dy } else { 0 } + fan,
                self.z,
            ),
        }
    }
}

fn parse_exit(text: &str) -> Option<ExitSpec> {
    let mut parts = text.split(',').map(str::trim);
    let area = parts.next().filter(|a| !a.is_empty())?;
    let (x, wide_x) = parse_wide(parts.next()?)?;
    let (y, wide_y) = parse_wide(parts.next()?)?;
    let z_part = parts.next()?;
    let (z_text, fan_rows) = match z_part.strip_suffix('+') {
        Some(base) => (base.trim_end(), true),
        None => (z_part, false),
    };
    let z = z_text.parse::<f32>().ok().filter(|z| z.is_finite())?;
    if parts.next().is_some() {
        return None;
    }
    Some(ExitSpec {
        area: area.to_string(),
        x,
        y,
        z,
        wide_x,
        wide_y,
        fan_rows,
    })
}

fn parse_wide(part: &str) -> Option<(i32, bool)> {
    match part.strip_suffix('+') {
        Some(base) => Some((base.parse().ok()?, true)),
        None => Some((part.parse().ok()?, false)),
    }
}

fn parse_color(text: &str) -> Option<Color> {
    let channels = text
        .split(',')
        .map(|part| part.trim().parse::<u8>().ok())
        .collect::<Option<Vec<_>>>()?;
    match channels.as_slice() {
        &[r, g, b, a] => Some(Color { r, g, b, a }),
        _ => None,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
