//! Where Stanza stores its own data (config, library snapshot).

use std::path::PathBuf;

/// Returns the directory where Stanza stores config and the library snapshot.
/// On macOS: `~/Library/Application Support/Stanza/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Stanza", "Stanza")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
