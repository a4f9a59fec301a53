use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Per-chat workspace directory name: `chat_<md5 of the chat key>`.
pub fn chat_workspace_name(chat_key: &str) -> String {
    format!("chat_{:x}", md5::compute(chat_key.trim().as_bytes()))
}

pub fn chat_workspace_dir(root: &Path, chat_key: &str) -> PathBuf {
    root.join(chat_workspace_name(chat_key))
}

pub fn ensure_workspace(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Workspace directories under `root`, sorted by path. A missing root yields none.
pub fn list_workspaces(root: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Timer scope key for a workspace.
pub fn timer_scope(dir: &Path) -> String {
    dir.to_string_lossy().into_owned()
}

const CHAT_KEY_FILE: &str = ".chat";

/// Records which chat a workspace belongs to, so background work can reach it.
pub fn write_chat_key(dir: &Path, chat_key: &str) -> io::Result<()> {
    ensure_workspace(dir)?;
    fs::write(dir.join(CHAT_KEY_FILE), chat_key.trim())
}

pub fn read_chat_key(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(CHAT_KEY_FILE))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn chat_workspace_is_stable_and_hashed() {
        let root = Path::new("/srv/image_session/workspaces");
        let dir = chat_workspace_dir(root, "telegram:12345");
        assert_eq!(dir, chat_workspace_dir(root, " telegram:12345 "));
        let name = chat_workspace_name("telegram:12345");
        assert!(name.starts_with("chat_"));
        assert_eq!(name.len(), "chat_".len() + 32);
        assert_ne!(name, chat_workspace_name("telegram:54321"));
    }

    #[test]
    fn chat_key_round_trips_through_the_workspace() {
        let temp = TempDir::new().expect("tempdir");
        let dir = chat_workspace_dir(temp.path(), "42");
        assert_eq!(read_chat_key(&dir), None);

        write_chat_key(&dir, "42").expect("write");

        assert_eq!(read_chat_key(&dir).as_deref(), Some("42"));
        assert_eq!(list_workspaces(temp.path()).expect("list"), vec![dir]);
    }
}
