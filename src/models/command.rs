use anyhow::{Context, Result, anyhow};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbaImage};
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use tracing::{debug, info};

use super::{ColorizeOptions, Colorizer, Inpainter};
use crate::error::{ErrorKind, LocalizeResult};

/// Inpainting through an external program.
///
/// The template is `[program, args...]`; `{image}`, `{mask}` and `{output}`
/// are replaced with PNG paths in a scratch directory.
#[derive(Debug, Clone)]
pub struct CommandInpainter {
    template: Vec<String>,
}

impl CommandInpainter {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }

    fn run(&self, image: &RgbaImage, mask: &GrayImage) -> Result<RgbaImage> {
        let dir = tempdir().with_context(|| "failed to create temp dir for inpainting")?;
        let image_path = dir.path().join("image.png");
        let mask_path = dir.path().join("mask.png");
        let output_path = dir.path().join("output.png");
        image
            .save(&image_path)
            .with_context(|| "failed to write inpaint input")?;
        mask.save(&mask_path)
            .with_context(|| "failed to write inpaint mask")?;

        let args = expand_template(
            &self.template,
            &[
                ("image", path_arg(&image_path)),
                ("mask", path_arg(&mask_path)),
                ("output", path_arg(&output_path)),
            ],
        );
        run_template(&args)?;
        read_output(&output_path, image.dimensions())
    }
}

impl Inpainter for CommandInpainter {
    fn inpaint(&self, image: &RgbaImage, mask: &GrayImage) -> LocalizeResult<RgbaImage> {
        self.run(image, mask)
            .map_err(|err| ErrorKind::InpaintingUnavailable(format!("{:#}", err)))
    }
}

/// Colorization through an external program.
///
/// Placeholders: `{input}`, `{output}`, `{width}`, `{denoise}`, `{sigma}`.
#[derive(Debug, Clone)]
pub struct CommandColorizer {
    template: Vec<String>,
}

impl CommandColorizer {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }

    fn run(&self, image: &RgbaImage, options: &ColorizeOptions) -> Result<RgbaImage> {
        let dir = tempdir().with_context(|| "failed to create temp dir for colorization")?;
        let input_path = dir.path().join("input.png");
        let output_path = dir.path().join("output.png");
        image
            .save(&input_path)
            .with_context(|| "failed to write colorize input")?;

        let args = expand_template(
            &self.template,
            &[
                ("input", path_arg(&input_path)),
                ("output", path_arg(&output_path)),
                ("width", options.width.to_string()),
                ("denoise", options.denoise.to_string()),
                ("sigma", options.sigma.to_string()),
            ],
        );
        info!(width = options.width, "colorizing page");
        run_template(&args)?;
        read_output(&output_path, image.dimensions())
    }
}

impl Colorizer for CommandColorizer {
    fn colorize(
        &self,
        image: &RgbaImage,
        options: &ColorizeOptions,
    ) -> LocalizeResult<RgbaImage> {
        self.run(image, options)
            .map_err(|err| ErrorKind::ColorizationFailure(format!("{:#}", err)))
    }
}

pub(crate) fn expand_template(template: &[String], vars: &[(&str, String)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let mut out = arg.clone();
            for (key, value) in vars {
                out = out.replace(&format!("{{{}}}", key), value);
            }
            out
        })
        .collect()
}

fn run_template(args: &[String]) -> Result<()> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("empty command template"))?;
    if !command_exists(program) {
        return Err(anyhow!("command not found: {}", program));
    }
    debug!(program = %program, args = ?rest, "running model command");
    let output = Command::new(program)
        .args(rest)
        .output()
        .with_context(|| format!("failed to run {}", program))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{} failed: {}", program, stderr.trim()));
    }
    Ok(())
}

/// Reads the program's PNG output, resized back to the source size if needed.
fn read_output(path: &Path, (width, height): (u32, u32)) -> Result<RgbaImage> {
    let bytes =
        fs::read(path).with_context(|| format!("command produced no output: {}", path.display()))?;
    let image = image::load_from_memory(&bytes)
        .with_context(|| "failed to decode command output")?
        .to_rgba8();
    if image.dimensions() == (width, height) {
        return Ok(image);
    }
    Ok(DynamicImage::ImageRgba8(image)
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgba8())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub(crate) fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.components().count() > 1 {
        return is_executable(path);
    }

    let path_var = match env::var_os("PATH") {
        Some(value) => value,
        None => return false,
    };

    #[cfg(windows)]
    let candidates = windows_command_candidates(cmd);
    #[cfg(not(windows))]
    let candidates = vec![cmd.to_string()];

    for dir in env::split_paths(&path_var) {
        for candidate in &candidates {
            if is_executable(&dir.join(candidate)) {
                return true;
            }
        }
    }
    false
}

fn is_executable(path: &Path) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(value) => value,
        Err(_) => return false,
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(windows)]
fn windows_command_candidates(cmd: &str) -> Vec<String> {
    let path = Path::new(cmd);
    if path.extension().is_some() {
        return vec![cmd.to_string()];
    }
    let pathext = env::var_os("PATHEXT").unwrap_or_else(|| ".EXE;.CMD;.BAT;.COM".into());
    pathext
        .to_string_lossy()
        .split(';')
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!("{}{}", cmd, ext.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted_in_every_argument() {
        let template = vec![
            "colorize".to_string(),
            "--in={input}".to_string(),
            "{output}".to_string(),
            "-w".to_string(),
            "{width}".to_string(),
            "{unknown}".to_string(),
        ];
        let args = expand_template(
            &template,
            &[
                ("input", "/tmp/a.png".to_string()),
                ("output", "/tmp/b.png".to_string()),
                ("width", "800".to_string()),
            ],
        );
        assert_eq!(
            args,
            vec!["colorize", "--in=/tmp/a.png", "/tmp/b.png", "-w", "800", "{unknown}"]
        );
    }

    #[test]
    fn missing_program_is_unavailable() {
        let inpainter = CommandInpainter::new(vec![
            "/nonexistent/lama-cleaner".to_string(),
            "{image}".to_string(),
        ]);
        let err = inpainter
            .inpaint(&RgbaImage::new(2, 2), &GrayImage::new(2, 2))
            .unwrap_err();
        assert!(matches!(err, ErrorKind::InpaintingUnavailable(_)));
    }

    #[test]
    fn empty_template_fails_colorization() {
        let colorizer = CommandColorizer::new(Vec::new());
        let options = ColorizeOptions::for_width(64, true, 25);
        let err = colorizer
            .colorize(&RgbaImage::new(2, 2), &options)
            .unwrap_err();
        assert!(matches!(err, ErrorKind::ColorizationFailure(_)));
    }

    #[test]
    fn missing_commands_are_reported() {
        assert!(!command_exists("/nonexistent/definitely-not-here"));
    }
}
