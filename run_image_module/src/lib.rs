mod run_image;

pub use run_image::{
    generate_image, output_file_name, GenerateImageOutput, GenerateImageParams, ImageAction,
    ImageFormat, RunImageError,
};
