use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GenerateImageParams {
    /// Program followed by any leading arguments, e.g. `["python3", "replicate_image.py"]`.
    pub command: Vec<String>,
    pub model: String,
    pub prompt: String,
    /// Ordered input images; the first one is the image being edited.
    pub inputs: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub timeout: Duration,
    /// When non-empty, every input and the output must live under one of these roots.
    pub allowed_prefixes: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    Generate,
    Edit,
    Compose,
}

impl ImageAction {
    pub fn for_input_count(count: usize) -> Self {
        match count {
            0 => ImageAction::Generate,
            1 => ImageAction::Edit,
            _ => ImageAction::Compose,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageAction::Generate => "generate",
            ImageAction::Edit => "edit",
            ImageAction::Compose => "compose",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateImageOutput {
    pub image_path: PathBuf,
    pub action: ImageAction,
    /// `None` when the file header was not recognized; the file is still returned.
    pub format: Option<ImageFormat>,
    pub command_output: String,
}
