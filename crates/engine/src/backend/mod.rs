mod images;
mod platform;
mod scripts;
mod sounds;

pub use images::{ImageBackend, ImageHandle, NullImages, TiledImageHandle};
pub use platform::{HeadlessPlatform, SimulatedPlatform};
pub use scripts::{HookKind, NullScripts, ScriptCommand, ScriptEvent, ScriptHost, ScriptRef};
pub use sounds::{NullSounds, PlayingHandle, SoundBackend, SoundHandle};

#[cfg(test)]
pub(crate) use scripts::recording::RecordingScripts;

use crate::content::ResourceLoader;

/// The external collaborators the simulation core calls out to.
pub struct Backends {
    pub resources: Box<dyn ResourceLoader>,
    pub images: Box<dyn ImageBackend>,
    pub sounds: Box<dyn SoundBackend>,
    pub scripts: Box<dyn ScriptHost>,
}

impl Backends {
    /// Null image, sound and script backends over the given resources.
    pub fn headless(resources: impl ResourceLoader + 'static) -> Self {
        Self {
            resources: Box::new(resources),
            images: Box::new(NullImages::new()),
            sounds: Box::new(NullSounds::new()),
            scripts: Box::new(NullScripts::new()),
        }
    }

    pub fn with_scripts(mut self, scripts: impl ScriptHost + 'static) -> Self {
        self.scripts = Box::new(scripts);
        self
    }
}
