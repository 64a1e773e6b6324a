pub(crate) mod average;
pub(crate) mod grid;
pub(crate) mod info;
pub(crate) mod nsd;

use std::path::{Path, PathBuf};

/// Model names shown in tables: the file stem of each input.
pub(crate) fn model_names(inputs: &[PathBuf]) -> Vec<String> {
    inputs
        .iter()
        .map(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("model")
                .to_string()
        })
        .collect()
}

/// Create the parent directory of `path` if it does not exist yet.
pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
