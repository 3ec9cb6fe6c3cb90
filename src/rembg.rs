use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::errors::{BridgeError, Result};
use crate::layout::InstallLayout;
use crate::status::{Status, StatusWriter};
use crate::traits::BackgroundRemover;

pub const CAPABILITY: &str = "Background removal";
pub const INSTALL_GUIDANCE: &str =
    "Rebuild with ONNX Runtime support: cargo install image-bridge --features rembg";

/// Whether this build can run background removal at all.
pub const fn is_available() -> bool {
    cfg!(feature = "rembg")
}

fn unavailable() -> BridgeError {
    BridgeError::CapabilityUnavailable {
        capability: CAPABILITY.to_string(),
        guidance: INSTALL_GUIDANCE.to_string(),
    }
}

fn ensure_available() -> Result<()> {
    debug!(available = is_available(), "background removal capability");
    if is_available() {
        Ok(())
    } else {
        Err(unavailable())
    }
}

#[cfg(feature = "rembg")]
fn load_remover(model_path: &Path) -> Result<Box<dyn BackgroundRemover>> {
    Ok(Box::new(crate::model::U2NetRemover::new(model_path)?))
}

#[cfg(not(feature = "rembg"))]
fn load_remover(_model_path: &Path) -> Result<Box<dyn BackgroundRemover>> {
    Err(unavailable())
}

/// Full remove-background operation using the bundled (or configured) model.
pub fn run<W: Write>(
    input: &Path,
    output: &Path,
    layout: &InstallLayout,
    status: &mut StatusWriter<W>,
) -> Result<()> {
    status.emit(Status::Processing)?;
    status.emit(Status::RemovingBg)?;

    ensure_available()?;

    let model_path = layout.rembg_model();
    if !model_path.is_file() {
        return Err(BridgeError::ModelFileNotFound { path: model_path });
    }

    status.emit(Status::LoadingModel)?;
    info!(model = %model_path.display(), "loading background removal model");
    let remover = load_remover(&model_path)?;

    remove_with(remover.as_ref(), input, output, status)
}

/// Reads `input`, strips its background with `remover` and writes the
/// result to `output` byte for byte.
pub fn remove_with<R, W>(
    remover: &R,
    input: &Path,
    output: &Path,
    status: &mut StatusWriter<W>,
) -> Result<()>
where
    R: BackgroundRemover + ?Sized,
    W: Write,
{
    let data = fs::read(input).map_err(|e| BridgeError::file_system("read input", input, e))?;

    status.emit(Status::RemovingBackground)?;
    let cutout = remover.remove_background(&data)?;

    status.emit(Status::Saving)?;
    fs::write(output, cutout).map_err(|e| BridgeError::file_system("write output", output, e))
}
