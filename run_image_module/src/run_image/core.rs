use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::process::Command;
use tracing::{info, warn};

use super::errors::RunImageError;
use super::types::{GenerateImageOutput, GenerateImageParams, ImageAction};
use super::utils::{run_command_with_timeout, tail_string};
use super::validate::{
    inspect_output, parse_media_path, validate_input_path, validate_output_path,
};

const OUTPUT_TAIL_LEN: usize = 2000;
const FILENAME_PROMPT_CHARS: usize = 30;

pub fn generate_image(params: &GenerateImageParams) -> Result<GenerateImageOutput, RunImageError> {
    if params.prompt.trim().is_empty() {
        return Err(RunImageError::EmptyPrompt);
    }
    let (program, leading_args) = params
        .command
        .split_first()
        .filter(|(program, _)| !program.trim().is_empty())
        .ok_or(RunImageError::EmptyCommand)?;

    let mut inputs = Vec::with_capacity(params.inputs.len());
    for input in &params.inputs {
        inputs.push(validate_input_path(input, &params.allowed_prefixes)?);
    }
    let output_path = validate_output_path(&params.output_path, &params.allowed_prefixes)?;
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let action = ImageAction::for_input_count(inputs.len());
    let mut cmd = Command::new(program);
    cmd.args(leading_args)
        .arg(action.as_str())
        .arg("--model")
        .arg(&params.model)
        .arg("--prompt")
        .arg(&params.prompt);
    for input in &inputs {
        cmd.arg("--input").arg(input);
    }
    cmd.arg("--output").arg(&output_path);
    if let Some(resolution) = params.resolution.as_deref() {
        cmd.arg("--resolution").arg(resolution);
    }
    if let Some(aspect_ratio) = params.aspect_ratio.as_deref() {
        cmd.arg("--aspect-ratio").arg(aspect_ratio);
    }

    info!(
        "running image command {} ({}, model {}, {} input(s))",
        program,
        action.as_str(),
        params.model,
        inputs.len()
    );
    let output = run_command_with_timeout(cmd, params.timeout).map_err(|err| match err {
        RunImageError::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
            RunImageError::CommandNotFound {
                program: program.clone(),
            }
        }
        other => other,
    })?;

    let combined = output.combined();
    if !output.status.success() {
        return Err(RunImageError::CommandFailed {
            status: output.status.code(),
            output: tail_string(&combined, OUTPUT_TAIL_LEN),
        });
    }

    let image_path = parse_media_path(&output.stdout).unwrap_or(output_path);
    if !image_path.is_file() {
        return Err(RunImageError::OutputMissing {
            path: image_path,
            output: tail_string(&combined, OUTPUT_TAIL_LEN),
        });
    }
    let format = inspect_output(&image_path)?;
    if format.is_none() {
        warn!(
            "image command output {} has an unrecognized header",
            image_path.display()
        );
    }

    Ok(GenerateImageOutput {
        image_path,
        action,
        format,
        command_output: tail_string(&combined, OUTPUT_TAIL_LEN),
    })
}

/// Timestamped output file name derived from the prompt.
pub fn output_file_name(prompt: &str, now: DateTime<Local>) -> String {
    format!(
        "{}-{}.png",
        now.format("%Y-%m-%d-%H-%M-%S"),
        sanitize_file_stem(prompt)
    )
}

pub(super) fn sanitize_file_stem(text: &str) -> String {
    let mut stem = String::new();
    for ch in text.chars().take(FILENAME_PROMPT_CHARS) {
        let ch = if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            ch
        } else {
            '-'
        };
        if ch == '-' && stem.ends_with('-') {
            continue;
        }
        stem.push(ch);
    }
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "output".to_string()
    } else {
        stem.to_string()
    }
}
