use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use run_image_module::{generate_image, output_file_name, GenerateImageParams};

use crate::session::SessionMode;

/// Failure reported by an image generator; the message is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct GenerateFailure(pub String);

impl GenerateFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Produces a new image file from ordered inputs and an instruction.
pub trait ImageGenerator {
    fn generate(
        &self,
        inputs: &[PathBuf],
        prompt: &str,
        mode: SessionMode,
        output_dir: &Path,
    ) -> Result<PathBuf, GenerateFailure>;
}

impl<F> ImageGenerator for F
where
    F: Fn(&[PathBuf], &str, SessionMode, &Path) -> Result<PathBuf, GenerateFailure>,
{
    fn generate(
        &self,
        inputs: &[PathBuf],
        prompt: &str,
        mode: SessionMode,
        output_dir: &Path,
    ) -> Result<PathBuf, GenerateFailure> {
        self(inputs, prompt, mode, output_dir)
    }
}

/// Runs the external image-studio command.
#[derive(Debug, Clone)]
pub struct CommandImageGenerator {
    pub command: Vec<String>,
    pub model: String,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub timeout: Duration,
    pub allowed_prefixes: Vec<PathBuf>,
}

const REFERENCE_HINT: &str =
    "Edit the first image. Use the second image only as a style and content reference.";

impl CommandImageGenerator {
    fn build_prompt(prompt: &str, mode: SessionMode) -> String {
        match mode {
            SessionMode::PromptOnly => prompt.trim().to_string(),
            SessionMode::ReferenceGuided => format!("{} {}", REFERENCE_HINT, prompt.trim()),
        }
    }
}

impl ImageGenerator for CommandImageGenerator {
    fn generate(
        &self,
        inputs: &[PathBuf],
        prompt: &str,
        mode: SessionMode,
        output_dir: &Path,
    ) -> Result<PathBuf, GenerateFailure> {
        let params = GenerateImageParams {
            command: self.command.clone(),
            model: self.model.clone(),
            prompt: Self::build_prompt(prompt, mode),
            inputs: inputs.to_vec(),
            output_path: output_dir.join(output_file_name(prompt, Local::now())),
            resolution: self.resolution.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            timeout: self.timeout,
            allowed_prefixes: self.allowed_prefixes.clone(),
        };
        let output = generate_image(&params).map_err(|err| GenerateFailure(err.to_string()))?;
        info!(
            "image command produced {} ({})",
            output.image_path.display(),
            output.action.as_str()
        );

        // The command always names its output .png; keep the real format's extension.
        let Some(format) = output.format else {
            return Ok(output.image_path);
        };
        let current_ext = output
            .image_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        let matches = match current_ext.as_deref() {
            Some("jpeg") => format.extension() == "jpg",
            Some(ext) => ext == format.extension(),
            None => false,
        };
        if matches {
            return Ok(output.image_path);
        }
        let renamed = output.image_path.with_extension(format.extension());
        match fs::rename(&output.image_path, &renamed) {
            Ok(()) => Ok(renamed),
            Err(err) => {
                warn!(
                    "failed to rename {} to match its format: {}",
                    output.image_path.display(),
                    err
                );
                Ok(output.image_path)
            }
        }
    }
}
