use serde::Deserialize;
use thiserror::Error;

use super::resources::{load_json, ResourceError, ResourceLoader};

pub const WORLD_CONFIG_PATH: &str = "world.json";

/// How characters travel between tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveMode {
    /// Steps complete instantly and each player action advances one turn.
    Turn,
    /// Characters glide from tile to tile in real time.
    #[default]
    Tile,
    /// Free movement. Treated like `Tile` for now.
    Notile,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 240,
            height: 160,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fullscreen: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartConfig {
    pub area: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerConfig {
    pub descriptor: String,
    #[serde(default = "default_phase")]
    pub phase: String,
}

fn default_phase() -> String {
    crate::tiles::STANCE_PHASE.to_string()
}

fn default_true() -> bool {
    true
}

/// `world.json`: read once at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorldConfig {
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub move_mode: MoveMode,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub window: WindowConfig,
    pub start: StartConfig,
    pub player: PlayerConfig,
    #[serde(default)]
    pub on_init: Option<String>,
    #[serde(default = "default_true")]
    pub step_sounds: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load world config: {0}")]
    Resource(#[from] ResourceError),
    #[error("invalid world config: {0}")]
    Invalid(String),
}

pub fn load_world_config(loader: &dyn ResourceLoader, path: &str) -> Result<WorldConfig, ConfigError> {
    let config: WorldConfig = load_json(loader, path)?;
    if config.viewport.width == 0 || config.viewport.height == 0 {
        return Err(ConfigError::Invalid(format!(
            "viewport must be non-empty, got {}x{}",
            config.viewport.width, config.viewport.height
        )));
    }
    if config.start.area.is_empty() {
        return Err(ConfigError::Invalid("start.area is empty".to_string()));
    }
    Ok(config)
}
