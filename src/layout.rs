use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::{BridgeError, Result};

const UPSCALE_DIR: &str = "utils/upscale";
const REMBG_MODEL: &str = "utils/rembg/u2net.onnx";

/// Where the bundled tools live, relative to one installation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
    rembg_model: Option<PathBuf>,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rembg_model: None,
        }
    }

    /// `root` when given, else the root above the running binary
    /// (`<root>/bin/image-bridge` maps to `<root>`), else the working directory.
    pub fn discover(root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            return Self::new(root);
        }
        match std::env::current_exe() {
            Ok(exe) => Self::new(
                exe.parent()
                    .and_then(Path::parent)
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
            ),
            Err(err) => {
                warn!(error = %err, "cannot locate running executable, using working directory");
                Self::new(".")
            }
        }
    }

    /// Uses `model` instead of the bundled background removal model.
    pub fn with_rembg_model(mut self, model: Option<PathBuf>) -> Self {
        self.rembg_model = model;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upscale_dir(&self) -> PathBuf {
        self.root.join(UPSCALE_DIR)
    }

    pub fn upscale_executable(&self) -> Result<PathBuf> {
        let name = executable_name_for(std::env::consts::OS)?;
        Ok(self.upscale_dir().join(name))
    }

    pub fn models_dir(&self) -> PathBuf {
        self.upscale_dir().join("models")
    }

    pub fn rembg_model(&self) -> PathBuf {
        self.rembg_model
            .clone()
            .unwrap_or_else(|| self.root.join(REMBG_MODEL))
    }
}

/// File name of the bundled RealESRGAN build for `os`
/// (as reported by `std::env::consts::OS`).
pub fn executable_name_for(os: &str) -> Result<&'static str> {
    match os {
        "windows" => Ok("realesrgan-ncnn-vulkan.exe"),
        "linux" | "macos" => Ok("realesrgan-ncnn-vulkan"),
        other => Err(BridgeError::UnsupportedPlatform {
            os: other.to_string(),
        }),
    }
}
