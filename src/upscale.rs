use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, ImageFormat, ImageReader};
use tracing::{debug, info};

use crate::errors::{BridgeError, Result};
use crate::imageops_ai::alpha::AlphaChannel;
use crate::layout::InstallLayout;
use crate::status::{Status, StatusWriter};
use crate::traits::Upscaler;

const DEFAULT_SCALE: u32 = 4;

/// A named RealESRGAN model: its ncnn parameter/weight pair and the integer
/// factor it upscales by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    pub param: PathBuf,
    pub bin: PathBuf,
    pub scale: u32,
}

impl ModelDescriptor {
    /// Looks `name` up in `models_dir`; both `<name>.param` and `<name>.bin`
    /// must exist.
    pub fn resolve(models_dir: &Path, name: &str) -> Result<Self> {
        let param = models_dir.join(format!("{name}.param"));
        let bin = models_dir.join(format!("{name}.bin"));

        if !param.is_file() || !bin.is_file() {
            return Err(BridgeError::ModelFilesNotFound {
                model: name.to_string(),
                param,
                bin,
            });
        }

        Ok(Self {
            name: name.to_string(),
            param,
            bin,
            scale: scale_for_model(name),
        })
    }
}

/// Scale factor encoded in a model name. The first of `x2`, `x3`, `x4` found
/// wins; names without one upscale by 4.
pub fn scale_for_model(name: &str) -> u32 {
    [("x2", 2), ("x3", 3), ("x4", 4)]
        .into_iter()
        .find(|(marker, _)| name.contains(marker))
        .map_or(DEFAULT_SCALE, |(_, scale)| scale)
}

/// The bundled `realesrgan-ncnn-vulkan` executable.
#[derive(Debug, Clone)]
pub struct RealEsrgan {
    executable: PathBuf,
    models_dir: PathBuf,
}

impl RealEsrgan {
    pub fn locate(layout: &InstallLayout) -> Result<Self> {
        let executable = layout.upscale_executable()?;
        if !executable.is_file() {
            return Err(BridgeError::ExecutableNotFound { path: executable });
        }

        let models_dir = layout.models_dir();
        if !models_dir.is_dir() {
            return Err(BridgeError::ModelDirectoryNotFound { path: models_dir });
        }

        debug!(
            executable = %executable.display(),
            models = %models_dir.display(),
            "located RealESRGAN"
        );
        Ok(Self {
            executable,
            models_dir,
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }
}

impl Upscaler for RealEsrgan {
    fn upscale(&self, input: &Path, output: &Path, model: &ModelDescriptor) -> Result<()> {
        // The child runs inside the models directory, so relative paths would
        // resolve against the wrong place.
        let input = absolute(input)?;
        let output = absolute(output)?;
        let scale = model.scale.to_string();

        let mut command = Command::new(&self.executable);
        command
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .args(["-n", model.name.as_str(), "-s", scale.as_str(), "-f", "png"])
            .current_dir(&self.models_dir);
        debug!(?command, "spawning RealESRGAN");

        let result = command
            .output()
            .map_err(|e| BridgeError::file_system("spawn RealESRGAN", &self.executable, e))?;
        debug!(status = %result.status, "RealESRGAN exited");

        if !result.status.success() {
            return Err(BridgeError::UpscaleExecutionFailed {
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| BridgeError::file_system("resolve working directory", path, e))?;
    Ok(cwd.join(path))
}

/// Full upscale operation against the bundled executable.
pub fn run<W: Write>(
    model_name: &str,
    input: &Path,
    output: &Path,
    layout: &InstallLayout,
    status: &mut StatusWriter<W>,
) -> Result<()> {
    status.emit(Status::Processing)?;
    status.emit(Status::UpscalingStarted)?;

    let engine = RealEsrgan::locate(layout)?;
    let model = ModelDescriptor::resolve(engine.models_dir(), model_name)?;
    info!(model = %model.name, scale = model.scale, "model selected");
    status.emit(Status::ModelSelected(model.name.clone()))?;

    upscale_with(&engine, &model, input, output, status)
}

/// Runs `upscaler`, carrying the input's transparency across it: the
/// upscaler only produces opaque RGB, so the alpha channel is scaled
/// separately and written back into the result.
pub fn upscale_with<U, W>(
    upscaler: &U,
    model: &ModelDescriptor,
    input: &Path,
    output: &Path,
    status: &mut StatusWriter<W>,
) -> Result<()>
where
    U: Upscaler + ?Sized,
    W: Write,
{
    let alpha = scaled_alpha(input, model.scale)?;
    if alpha.is_some() {
        status.emit(Status::DetectedTransparentImage)?;
    }

    status.emit(Status::ExecutingUpscale)?;
    upscaler.upscale(input, output, model)?;

    if let Some(alpha) = alpha {
        status.emit(Status::RestoringTransparency)?;
        restore_alpha(output, &alpha)?;
    }

    status.emit(Status::UpscaleComplete)?;
    status.emit(Status::Saving)?;
    Ok(())
}

/// Alpha channel of the image at `input`, resized to `scale` times its
/// dimensions; `None` for opaque colour types.
fn scaled_alpha(input: &Path, scale: u32) -> Result<Option<GrayImage>> {
    let image = open_image(input, "open image")?;
    if !image.color().has_alpha() {
        return Ok(None);
    }

    let alpha = image.to_rgba8().extract_alpha();
    let (width, height) = alpha.dimensions();
    Ok(Some(imageops::resize(
        &alpha,
        width * scale,
        height * scale,
        FilterType::Lanczos3,
    )))
}

fn restore_alpha(output: &Path, alpha: &GrayImage) -> Result<()> {
    // The upscaler always writes PNG, whatever extension `output` carries.
    let mut upscaled = open_image(output, "reopen upscaled image")?.into_rgba8();
    upscaled.replace_alpha(alpha)?;
    upscaled
        .save_with_format(output, ImageFormat::Png)
        .map_err(|e| BridgeError::codec("save upscaled image", output.display().to_string(), e))
}

/// Decodes the image at `path`, choosing the codec from the file's leading
/// bytes and falling back to its extension.
pub(crate) fn open_image(path: &Path, operation: &str) -> Result<DynamicImage> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| BridgeError::file_system(operation, path, e))?
        .decode()
        .map_err(|e| open_error(operation, path, e))
}

/// A missing input is a filesystem problem, not a codec one.
fn open_error(operation: &str, path: &Path, err: image::ImageError) -> BridgeError {
    match err {
        image::ImageError::IoError(source) => BridgeError::file_system(operation, path, source),
        other => BridgeError::codec(operation, path.display().to_string(), other),
    }
}
