use std::env;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use super::errors::RunImageError;
use super::types::ImageFormat;

const MIN_IMAGE_BYTES: u64 = 100;

const IMAGE_MAGIC: &[(&[u8], ImageFormat)] = &[
    (b"\x89PNG", ImageFormat::Png),
    (b"\xff\xd8\xff", ImageFormat::Jpeg),
    (b"RIFF", ImageFormat::Webp),
    (b"GIF8", ImageFormat::Gif),
];

pub(super) fn validate_input_path(
    path: &Path,
    allowed_prefixes: &[PathBuf],
) -> Result<PathBuf, RunImageError> {
    reject_traversal("input image", path)?;
    if !path.is_file() {
        return Err(RunImageError::InvalidPath {
            label: "input image",
            path: path.to_path_buf(),
            reason: "file not found",
        });
    }
    let resolved = path.canonicalize()?;
    ensure_allowed("input image", &resolved, allowed_prefixes)?;
    Ok(resolved)
}

pub(super) fn validate_output_path(
    path: &Path,
    allowed_prefixes: &[PathBuf],
) -> Result<PathBuf, RunImageError> {
    reject_traversal("output", path)?;
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    ensure_allowed("output", &absolute, allowed_prefixes)?;
    Ok(absolute)
}

fn reject_traversal(label: &'static str, path: &Path) -> Result<(), RunImageError> {
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(RunImageError::InvalidPath {
            label,
            path: path.to_path_buf(),
            reason: "path traversal",
        });
    }
    Ok(())
}

fn ensure_allowed(
    label: &'static str,
    path: &Path,
    allowed_prefixes: &[PathBuf],
) -> Result<(), RunImageError> {
    if allowed_prefixes.is_empty() {
        return Ok(());
    }
    let allowed = allowed_prefixes.iter().any(|prefix| {
        let prefix = prefix.canonicalize().unwrap_or_else(|_| prefix.clone());
        path.starts_with(&prefix)
    });
    if allowed {
        Ok(())
    } else {
        Err(RunImageError::InvalidPath {
            label,
            path: path.to_path_buf(),
            reason: "not under an allowed directory",
        })
    }
}

/// Checks that `path` plausibly holds an image and sniffs its format.
pub(super) fn inspect_output(path: &Path) -> Result<Option<ImageFormat>, RunImageError> {
    let size = path.metadata()?.len();
    if size < MIN_IMAGE_BYTES {
        return Err(RunImageError::InvalidOutput {
            path: path.to_path_buf(),
            size,
        });
    }
    let mut header = [0u8; 12];
    let read = File::open(path)?.read(&mut header)?;
    Ok(sniff_format(&header[..read]))
}

pub(super) fn sniff_format(header: &[u8]) -> Option<ImageFormat> {
    IMAGE_MAGIC
        .iter()
        .find(|(magic, _)| header.starts_with(magic))
        .map(|(_, format)| *format)
}

/// Last `MEDIA:<path>` line printed by the image command, if any.
pub(super) fn parse_media_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .filter_map(|line| line.trim().strip_prefix("MEDIA:"))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}
