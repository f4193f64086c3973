use std::fmt;
use std::rc::Rc;

use crate::tiles::{EntityId, Icoord, Ivec2};

/// Opaque handle to a compiled script owned by the scripting backend.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ScriptRef(Rc<str>);

impl ScriptRef {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptRef({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Load,
    Focus,
    Tick,
    Turn,
    Enter,
    Leave,
    Use,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptEvent<'a> {
    pub hook: HookKind,
    pub area: &'a str,
    pub tile: Option<Icoord>,
    pub entity: Option<EntityId>,
}

/// Effects a hook asks for. They are applied by the area once the hook has
/// returned, so a hook never re-enters the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Destroy(EntityId),
    MoveByTile { entity: EntityId, delta: Ivec2 },
    SetFrozen { entity: EntityId, frozen: bool },
    RequestRedraw,
}

pub trait ScriptHost {
    fn compile(&mut self, path: &str, source: &[u8]) -> Option<ScriptRef>;
    fn invoke(&mut self, script: &ScriptRef, event: &ScriptEvent<'_>, commands: &mut Vec<ScriptCommand>);
}

/// Accepts every script and runs none of them.
#[derive(Debug, Default)]
pub struct NullScripts {
    invocations: u64,
}

impl NullScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocation_count(&self) -> u64 {
        self.invocations
    }
}

impl ScriptHost for NullScripts {
    fn compile(&mut self, path: &str, _source: &[u8]) -> Option<ScriptRef> {
        Some(ScriptRef::new(path))
    }

    fn invoke(&mut self, _script: &ScriptRef, _event: &ScriptEvent<'_>, _commands: &mut Vec<ScriptCommand>) {
        self.invocations = self.invocations.saturating_add(1);
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Invocation {
        pub script: String,
        pub hook: HookKind,
        pub area: String,
        pub tile: Option<Icoord>,
        pub entity: Option<EntityId>,
    }

    /// Test host: logs every invocation and replays canned commands per script.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingScripts {
        pub log: Rc<RefCell<Vec<Invocation>>>,
        pub responses: HashMap<String, Vec<ScriptCommand>>,
    }

    impl RecordingScripts {
        pub(crate) fn respond(mut self, script: &str, commands: Vec<ScriptCommand>) -> Self {
            self.responses.insert(script.to_string(), commands);
            self
        }

        pub(crate) fn calls_to(&self, script: &str) -> Vec<Invocation> {
            self.log
                .borrow()
                .iter()
                .filter(|call| call.script == script)
                .cloned()
                .collect()
        }
    }

    impl ScriptHost for RecordingScripts {
        fn compile(&mut self, path: &str, _source: &[u8]) -> Option<ScriptRef> {
            Some(ScriptRef::new(path))
        }

        fn invoke(
            &mut self,
            script: &ScriptRef,
            event: &ScriptEvent<'_>,
            commands: &mut Vec<ScriptCommand>,
        ) {
            self.log.borrow_mut().push(Invocation {
                script: script.name().to_string(),
                hook: event.hook,
                area: event.area.to_string(),
                tile: event.tile,
                entity: event.entity,
            });
            if let Some(canned) = self.responses.get(script.name()) {
                commands.extend(canned.iter().cloned());
            }
        }
    }
}
