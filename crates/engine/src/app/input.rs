#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Use,
    Escape,
}

const KEY_COUNT: usize = 6;

impl Key {
    const fn index(self) -> usize {
        match self {
            Key::Up => 0,
            Key::Down => 1,
            Key::Left => 2,
            Key::Right => 3,
            Key::Use => 4,
            Key::Escape => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn press(key: Key) -> Self {
        Self { key, pressed: true }
    }

    pub fn release(key: Key) -> Self {
        Self {
            key,
            pressed: false,
        }
    }
}

/// Tracks which keys are down and turns raw platform events into edges.
/// Auto-repeat presses of a key already down are swallowed, as are releases
/// of keys never seen going down.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyStates {
    down: [bool; KEY_COUNT],
}

impl KeyStates {
    pub fn is_down(&self, key: Key) -> bool {
        self.down[key.index()]
    }

    pub fn edge(&mut self, event: KeyEvent) -> Option<KeyEvent> {
        let slot = &mut self.down[event.key.index()];
        if *slot == event.pressed {
            return None;
        }
        *slot = event.pressed;
        Some(event)
    }

    /// Releases every held key, e.g. when the window loses focus.
    pub fn release_all(&mut self, out: &mut Vec<KeyEvent>) {
        for key in [Key::Up, Key::Down, Key::Left, Key::Right, Key::Use, Key::Escape] {
            if self.is_down(key) {
                self.down[key.index()] = false;
                out.push(KeyEvent::release(key));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_press_is_reported_once() {
        let mut keys = KeyStates::default();
        assert_eq!(keys.edge(KeyEvent::press(Key::Up)), Some(KeyEvent::press(Key::Up)));
        assert_eq!(keys.edge(KeyEvent::press(Key::Up)), None);
        assert!(keys.is_down(Key::Up));
        assert_eq!(
            keys.edge(KeyEvent::release(Key::Up)),
            Some(KeyEvent::release(Key::Up))
        );
        assert!(!keys.is_down(Key::Up));
    }

    #[test]
    fn stray_release_is_ignored() {
        let mut keys = KeyStates::default();
        assert_eq!(keys.edge(KeyEvent::release(Key::Left)), None);
    }

    #[test]
    fn release_all_emits_only_held_keys() {
        let mut keys = KeyStates::default();
        keys.edge(KeyEvent::press(Key::Right));
        keys.edge(KeyEvent::press(Key::Use));
        let mut out = Vec::new();
        keys.release_all(&mut out);
        assert_eq!(
            out,
            vec![KeyEvent::release(Key::Right), KeyEvent::release(Key::Use)]
        );
        assert!(!keys.is_down(Key::Right));
    }
}
