mod area_parser;
mod entity_desc;
mod resources;
mod scripts;
mod world_config;

pub use area_parser::{load_area, AreaErrorCode, AreaLoadError};
pub use entity_desc::{load_entity, EntityLoadError};
pub use resources::{load_json, DirResources, MemoryResources, ResourceError, ResourceLoader};
pub(crate) use scripts::load_script;
pub use world_config::{
    load_world_config, ConfigError, MoveMode, PlayerConfig, StartConfig, ViewportConfig,
    WindowConfig, WorldConfig, WORLD_CONFIG_PATH,
};
