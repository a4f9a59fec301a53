mod core;
mod errors;
mod types;
mod utils;
mod validate;

pub use core::{generate_image, output_file_name};
pub use errors::RunImageError;
pub use types::{GenerateImageOutput, GenerateImageParams, ImageAction, ImageFormat};
