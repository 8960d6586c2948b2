//! `wsbridge config`: open the config file in the user's editor.

use std::path::Path;
use std::process::Command;

use wsbridge_core::error::{BridgeError, Result};

const DEFAULT_EDITOR: &str = "vim";

/// `$EDITOR`, or `vim` when unset or empty.
pub fn editor_from_env() -> String {
    std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string())
}

/// Run `<editor> <path>` through the platform shell so editors given with
/// arguments (`code --wait`) work, and wait for it to exit.
pub fn open(editor: &str, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            BridgeError::Internal(format!("create {} failed: {e}", dir.display()))
        })?;
    }

    let mut cmd = if cfg!(windows) {
        // windows paths cannot contain '"'
        let mut c = Command::new("cmd");
        c.arg("/c").arg(format!("{editor} \"{}\"", path.display()));
        c
    } else {
        // the path travels as $1, never through shell parsing
        let mut c = Command::new("sh");
        c.arg("-c").arg(format!("{editor} \"$1\"")).arg("sh").arg(path);
        c
    };

    let status = cmd
        .status()
        .map_err(|e| BridgeError::Internal(format!("spawn editor {editor:?} failed: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(BridgeError::Internal(format!("editor exited with {status}")))
    }
}
