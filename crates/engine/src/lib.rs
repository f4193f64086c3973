use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod backend;
pub mod content;
pub mod tiles;

pub use app::{
    run_main_loop, AppError, Color, DisplayList, DrawItem, Key, KeyEvent, KeyStates,
    LoopConfig, LoopMetricsSnapshot, LoopSummary, Platform, Viewport,
};
pub use backend::{
    Backends, HeadlessPlatform, HookKind, ImageBackend, ImageHandle, NullImages, NullScripts,
    NullSounds, PlayingHandle, ScriptCommand, ScriptEvent, ScriptHost, ScriptRef,
    SimulatedPlatform, SoundBackend, SoundHandle, TiledImageHandle,
};
pub use content::{
    load_area, load_entity, load_json, load_world_config, AreaErrorCode, AreaLoadError,
    ConfigError, DirResources, EntityLoadError, MemoryResources, MoveMode, ResourceError,
    ResourceLoader, WorldConfig, WORLD_CONFIG_PATH,
};
pub use tiles::{Area, World, WorldError};

pub const WORLD_ENV_VAR: &str = "TILEGAME_WORLD";
pub const DEFAULT_WORLD_DIR: &str = "world";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error(
        "{env_var} is set but does not point to a world directory: {path}\n\
A world directory must contain world.json."
    )]
    InvalidEnvWorld { path: PathBuf, env_var: &'static str },
    #[error(
        "no world directory found at {path}\n\
Set {env_var} to a directory containing world.json, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/world\""
    )]
    WorldNotFound { path: PathBuf, env_var: &'static str },
}

/// The directory the world's resources are read from: `TILEGAME_WORLD` if
/// set, otherwise `world/` under the working directory.
pub fn resolve_world_dir() -> Result<PathBuf, StartupError> {
    match env::var(WORLD_ENV_VAR) {
        Ok(value) => {
            let path = normalize_path(Path::new(&value));
            if is_world_dir(&path) {
                Ok(path)
            } else {
                Err(StartupError::InvalidEnvWorld {
                    path,
                    env_var: WORLD_ENV_VAR,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let cwd = env::current_dir().map_err(StartupError::CurrentDir)?;
            let path = normalize_path(&cwd.join(DEFAULT_WORLD_DIR));
            if is_world_dir(&path) {
                Ok(path)
            } else {
                Err(StartupError::WorldNotFound {
                    path,
                    env_var: WORLD_ENV_VAR,
                })
            }
        }
        Err(source) => Err(StartupError::EnvVar {
            var: WORLD_ENV_VAR,
            source,
        }),
    }
}

fn is_world_dir(path: &Path) -> bool {
    path.join(WORLD_CONFIG_PATH).is_file()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
