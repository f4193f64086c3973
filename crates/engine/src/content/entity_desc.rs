use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::Backends;
use crate::tiles::{Animation, EntityHooks, EntitySprite, TileSize, TimeMs, STANCE_PHASE};

use super::resources::{parse_json, ResourceError};
use super::scripts::load_script;

const DEFAULT_FPS: f32 = 8.0;

#[derive(Debug, Deserialize)]
struct EntityDoc {
    speed: f32,
    sprite: SpriteDoc,
    #[serde(default)]
    step_sound: Option<String>,
    #[serde(default)]
    on_tick: Option<String>,
    #[serde(default)]
    on_turn: Option<String>,
    #[serde(default)]
    on_use: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpriteDoc {
    sheet: String,
    tile_width: u32,
    tile_height: u32,
    columns: u32,
    rows: u32,
    phases: BTreeMap<String, PhaseDoc>,
}

#[derive(Debug, Deserialize)]
struct PhaseDoc {
    frames: Vec<u32>,
    #[serde(default)]
    fps: Option<f32>,
}

#[derive(Debug, Error)]
pub enum EntityLoadError {
    #[error("entity '{descriptor}': {source}")]
    Resource {
        descriptor: String,
        #[source]
        source: ResourceError,
    },
    #[error("entity '{descriptor}': sprite sheet '{sheet}' could not be loaded")]
    SheetUnavailable { descriptor: String, sheet: String },
    #[error("entity '{descriptor}': phase '{phase}' uses frame {frame}, outside the sheet")]
    FrameOutOfRange {
        descriptor: String,
        phase: String,
        frame: u32,
    },
    #[error("entity '{descriptor}': phase '{phase}' has no frames")]
    EmptyPhase { descriptor: String, phase: String },
    #[error("entity '{descriptor}': no 'stance' phase")]
    MissingStance { descriptor: String },
    #[error("entity '{descriptor}': {message}")]
    InvalidValue { descriptor: String, message: String },
}

/// Loads an entity descriptor: its sprite sheet, phases, speed, step sound
/// and hooks.
pub fn load_entity(descriptor: &str, backends: &mut Backends) -> Result<EntitySprite, EntityLoadError> {
    let resource_error = |source| EntityLoadError::Resource {
        descriptor: descriptor.to_string(),
        source,
    };
    let bytes = backends
        .resources
        .load_bytes(descriptor)
        .map_err(resource_error)?;
    let doc: EntityDoc = parse_json(descriptor, &bytes).map_err(resource_error)?;

    if !doc.speed.is_finite() || doc.speed < 0.0 {
        return Err(EntityLoadError::InvalidValue {
            descriptor: descriptor.to_string(),
            message: format!("speed must be a non-negative number, got {}", doc.speed),
        });
    }
    let sprite = &doc.sprite;
    if sprite.tile_width == 0 || sprite.tile_height == 0 {
        return Err(EntityLoadError::InvalidValue {
            descriptor: descriptor.to_string(),
            message: "sprite tile size must be non-zero".to_string(),
        });
    }
    if !sprite.phases.contains_key(STANCE_PHASE) {
        return Err(EntityLoadError::MissingStance {
            descriptor: descriptor.to_string(),
        });
    }

    let tile = TileSize::new(sprite.tile_width, sprite.tile_height);
    let sheet = backends
        .images
        .load_tiled_image(&sprite.sheet, tile, sprite.columns, sprite.rows)
        .ok_or_else(|| EntityLoadError::SheetUnavailable {
            descriptor: descriptor.to_string(),
            sheet: sprite.sheet.clone(),
        })?;

    let mut phases = HashMap::with_capacity(sprite.phases.len());
    for (name, phase) in &sprite.phases {
        if phase.frames.is_empty() {
            return Err(EntityLoadError::EmptyPhase {
                descriptor: descriptor.to_string(),
                phase: name.clone(),
            });
        }
        let mut frames = Vec::with_capacity(phase.frames.len());
        for &frame in &phase.frames {
            let image = backends.images.image_at(sheet, frame).ok_or_else(|| {
                EntityLoadError::FrameOutOfRange {
                    descriptor: descriptor.to_string(),
                    phase: name.clone(),
                    frame,
                }
            })?;
            frames.push(image);
        }
        let fps = phase.fps.unwrap_or(DEFAULT_FPS);
        if !fps.is_finite() || fps <= 0.0 {
            return Err(EntityLoadError::InvalidValue {
                descriptor: descriptor.to_string(),
                message: format!("phase '{name}' fps must be positive, got {fps}"),
            });
        }
        let frame_duration = (1000.0 / fps).round() as TimeMs;
        phases.insert(name.clone(), Animation::new(frames, frame_duration));
    }

    let step_sound = doc.step_sound.as_deref().and_then(|path| {
        let sound = backends.sounds.load_sound(path);
        if sound.is_none() {
            warn!(entity = descriptor, sound = path, "sound_missing");
        }
        sound
    });

    let mut hook = |path: &Option<String>| {
        path.as_deref()
            .and_then(|path| load_script(path, descriptor, backends))
    };
    let hooks = EntityHooks {
        on_tick: hook(&doc.on_tick),
        on_turn: hook(&doc.on_turn),
        on_use: hook(&doc.on_use),
    };

    debug!(
        entity = descriptor,
        phases = phases.len(),
        speed = doc.speed,
        "entity_loaded"
    );
    Ok(EntitySprite {
        phases,
        size: (sprite.tile_width, sprite.tile_height),
        speed: doc.speed,
        step_sound,
        hooks,
    })
}
