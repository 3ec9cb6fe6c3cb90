use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the image bridge.
///
/// Each variant carries the context the calling process needs to act on the
/// failure (which file was missing, what the external tool printed, how to
/// install a missing capability). The dispatcher is the only place that turns
/// these into protocol lines; operations just return them.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("RealESRGAN executable not found at {path:?}")]
    ExecutableNotFound { path: PathBuf },

    #[error("Models directory not found at {path:?}")]
    ModelDirectoryNotFound { path: PathBuf },

    #[error("Model files not found for {model} (expected {param:?} and {bin:?})")]
    ModelFilesNotFound {
        model: String,
        param: PathBuf,
        bin: PathBuf,
    },

    #[error("Unsupported operating system: {os}")]
    UnsupportedPlatform { os: String },

    #[error("RealESRGAN failed ({}): {stderr}", describe_exit(.code))]
    UpscaleExecutionFailed { code: Option<i32>, stderr: String },

    #[error("{capability} is not available. {guidance}")]
    CapabilityUnavailable {
        capability: String,
        guidance: String,
    },

    #[error("Background removal model not found at {path:?}")]
    ModelFileNotFound { path: PathBuf },

    #[error("Image codec error: {operation} failed (file: {path})")]
    Codec {
        operation: String,
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl BridgeError {
    /// Stable kind name, printed at the head of the `TRACEBACK:` line.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound { .. } => "ExecutableNotFound",
            Self::ModelDirectoryNotFound { .. } => "ModelDirectoryNotFound",
            Self::ModelFilesNotFound { .. } => "ModelFilesNotFound",
            Self::UnsupportedPlatform { .. } => "UnsupportedPlatform",
            Self::UpscaleExecutionFailed { .. } => "UpscaleExecutionFailed",
            Self::CapabilityUnavailable { .. } => "CapabilityUnavailable",
            Self::ModelFileNotFound { .. } => "ModelFileNotFound",
            Self::Codec { .. } => "CodecError",
            Self::UnsupportedFormat { .. } => "UnsupportedFormat",
            Self::FileSystem { .. } => "FileSystemError",
            Self::Model { .. } => "ModelError",
            Self::UnknownCommand { .. } => "UnknownCommand",
        }
    }

    pub(crate) fn codec(
        operation: impl Into<String>,
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Codec {
            operation: operation.into(),
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn file_system(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }
}

/// Pixel helpers in `imageops_ai` report failures through anyhow; they all
/// concern image buffers, so they land in the codec category.
impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Codec {
            operation: "pixel transform".to_string(),
            path: "in-memory".to_string(),
            source: err.into(),
        }
    }
}

/// Fallback for I/O errors that occur without a specific path in scope.
/// Callers that know the path build `BridgeError::FileSystem` directly.
impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "io".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for BridgeError {
    fn from(err: image::ImageError) -> Self {
        Self::codec("image processing", "unknown", err)
    }
}

#[cfg(feature = "rembg")]
impl From<ort::Error> for BridgeError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors come out of tensor plumbing around inference, so they are
/// reported as model errors.
#[cfg(feature = "rembg")]
impl From<ndarray::ShapeError> for BridgeError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
