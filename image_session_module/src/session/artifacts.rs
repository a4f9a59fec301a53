use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::warn;

pub(crate) const ORIGINAL_STEM: &str = "original";
pub(crate) const REFERENCE_STEM: &str = "reference";
pub(crate) const CURRENT_STEM: &str = "current";
pub(crate) const PENDING_DIR: &str = "pending";

const SESSION_STEMS: [&str; 3] = [ORIGINAL_STEM, REFERENCE_STEM, CURRENT_STEM];
const DEFAULT_EXTENSION: &str = "png";

pub(crate) fn pending_dir(workspace: &Path) -> PathBuf {
    workspace.join(PENDING_DIR)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Copies `src` into the workspace as `<stem>.<ext>`, replacing any earlier
/// file with the same stem.
pub fn import_image(src: &Path, workspace: &Path, stem: &str) -> io::Result<PathBuf> {
    let metadata = fs::metadata(src)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} is not a regular file", src.display()),
        ));
    }
    fs::create_dir_all(workspace)?;
    let target = workspace.join(format!("{}.{}", stem, extension_of(src)));
    if same_file(src, &target) {
        remove_stem_except(workspace, stem, Some(&target));
        return Ok(target);
    }
    let temp = workspace.join(format!(".{}.import.tmp", stem));
    fs::copy(src, &temp)?;
    fs::rename(&temp, &target)?;
    remove_stem_except(workspace, stem, Some(&target));
    Ok(target)
}

/// Places a generator output in the workspace as `current.<ext>`. Outputs
/// under `pending/` are moved; any other file is copied and left in place.
pub fn adopt_output(output: &Path, workspace: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(workspace)?;
    let target = workspace.join(format!("{}.{}", CURRENT_STEM, extension_of(output)));
    if !same_file(output, &target) {
        if is_pending_output(output, workspace) {
            move_file(output, &target)?;
        } else {
            let temp = workspace.join(format!(".{}.adopt.tmp", CURRENT_STEM));
            fs::copy(output, &temp)?;
            fs::rename(&temp, &target)?;
        }
    }
    remove_stem_except(workspace, CURRENT_STEM, Some(&target));
    Ok(target)
}

/// True when `path` lies in the workspace's `pending/` directory, i.e. the
/// session owns it and may move or delete it.
pub(crate) fn is_pending_output(path: &Path, workspace: &Path) -> bool {
    match (fs::canonicalize(path), fs::canonicalize(pending_dir(workspace))) {
        (Ok(path), Ok(pending)) => path.starts_with(pending),
        _ => false,
    }
}

fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(err) if err.raw_os_error() == Some(18) => {
            fs::copy(src, dest)?;
            fs::remove_file(src)?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub fn remove_file_best_effort(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!("failed to remove {}: {}", path.display(), err);
            false
        }
    }
}

fn remove_stem_except(workspace: &Path, stem: &str, keep: Option<&Path>) -> usize {
    let entries = match fs::read_dir(workspace) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if keep.is_some_and(|keep| keep == path) {
            continue;
        }
        let matches = path.file_stem().and_then(|s| s.to_str()) == Some(stem)
            && path.extension().is_some()
            && path.is_file();
        if matches && remove_file_best_effort(&path) {
            removed += 1;
        }
    }
    removed
}

/// Removes every session image (and pending generator output) from the
/// workspace, except `keep`. Returns the number of files removed.
pub fn sweep_session_artifacts(workspace: &Path, keep: Option<&Path>) -> usize {
    let mut removed = SESSION_STEMS
        .iter()
        .map(|stem| remove_stem_except(workspace, stem, keep))
        .sum::<usize>();
    if let Ok(entries) = fs::read_dir(pending_dir(workspace)) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && remove_file_best_effort(&path) {
                removed += 1;
            }
        }
    }
    removed
}
