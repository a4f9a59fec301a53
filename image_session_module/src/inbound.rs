use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "gif", "bmp"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Most recently modified image in the inbound media directory.
pub fn latest_inbound_image(dir: &Path) -> io::Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if !metadata.is_file() || !is_image_path(&path) {
            continue;
        }
        let modified = metadata.modified()?;
        let newer = match latest.as_ref() {
            Some((best, best_path)) => modified > *best || (modified == *best && path > *best_path),
            None => true,
        };
        if newer {
            latest = Some((modified, path));
        }
    }
    Ok(latest.map(|(_, path)| path))
}
