use std::path::{Path, PathBuf};

pub const ONBOARD_DIR: &str = ".onboard";
pub const CONFIG_FILE: &str = ".onboard/config.yaml";
pub const DEFAULT_DATABASE: &str = ".onboard/portal.redb";
pub const DEFAULT_CATALOG: &str = ".onboard/catalog.yaml";

pub fn onboard_dir(root: &Path) -> PathBuf {
    root.join(ONBOARD_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured path: absolute paths are kept, relative ones hang
/// off the project root.
pub fn resolve(root: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}
