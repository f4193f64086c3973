use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayingHandle(pub u32);

/// Fire-and-forget audio. The core never waits on playback.
pub trait SoundBackend {
    fn load_sound(&mut self, path: &str) -> Option<SoundHandle>;
    fn play(&mut self, sound: SoundHandle) -> PlayingHandle;
    fn stop(&mut self, playing: PlayingHandle);
    fn set_volume(&mut self, playing: PlayingHandle, volume: f32);
    fn set_speed(&mut self, playing: PlayingHandle, speed: f32);
    fn is_playing(&self, playing: PlayingHandle) -> bool;
    fn release(&mut self, sound: SoundHandle);
}

/// Silent backend that remembers what was asked of it.
#[derive(Debug, Default)]
pub struct NullSounds {
    loaded: HashMap<String, SoundHandle>,
    paths: Vec<String>,
    playing: Vec<PlayingHandle>,
    play_log: Vec<SoundHandle>,
    next_playing: u32,
}

impl NullSounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play_count(&self) -> usize {
        self.play_log.len()
    }

    pub fn played_paths(&self) -> Vec<&str> {
        self.play_log
            .iter()
            .filter_map(|sound| self.paths.get(sound.0 as usize).map(String::as_str))
            .collect()
    }
}

impl SoundBackend for NullSounds {
    fn load_sound(&mut self, path: &str) -> Option<SoundHandle> {
        if let Some(handle) = self.loaded.get(path) {
            return Some(*handle);
        }
        let handle = SoundHandle(self.paths.len() as u32);
        self.paths.push(path.to_string());
        self.loaded.insert(path.to_string(), handle);
        Some(handle)
    }

    fn play(&mut self, sound: SoundHandle) -> PlayingHandle {
        let playing = PlayingHandle(self.next_playing);
        self.next_playing = self.next_playing.wrapping_add(1);
        self.play_log.push(sound);
        self.playing.push(playing);
        playing
    }

    fn stop(&mut self, playing: PlayingHandle) {
        self.playing.retain(|handle| *handle != playing);
    }

    fn set_volume(&mut self, _playing: PlayingHandle, _volume: f32) {}

    fn set_speed(&mut self, _playing: PlayingHandle, _speed: f32) {}

    fn is_playing(&self, playing: PlayingHandle) -> bool {
        self.playing.contains(&playing)
    }

    fn release(&mut self, sound: SoundHandle) {
        self.loaded.retain(|_, handle| *handle != sound);
    }
}
