use tracing::warn;

use crate::backend::{Backends, ScriptRef};

/// Reads and compiles an optional script. A missing or rejected script is
/// logged and dropped; the caller carries on without it.
pub(crate) fn load_script(path: &str, owner: &str, backends: &mut Backends) -> Option<ScriptRef> {
    let source = match backends.resources.load_bytes(path) {
        Ok(source) => source,
        Err(error) => {
            warn!(script = path, owner, error = %error, "script_missing");
            return None;
        }
    };
    let script = backends.scripts.compile(path, &source);
    if script.is_none() {
        warn!(script = path, owner, "script_compile_failed");
    }
    script
}
