//! Line-oriented progress protocol written to standard output.
//!
//! A calling process reads one event per line and keys its progress display
//! on the exact tokens below, so their spelling is part of the interface.

use std::fmt;
use std::io::Write;

use crate::errors::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Processing,
    UpscalingStarted,
    ModelSelected(String),
    DetectedTransparentImage,
    ExecutingUpscale,
    RestoringTransparency,
    UpscaleComplete,
    RemovingBg,
    LoadingModel,
    RemovingBackground,
    ConvertingImage,
    LoadingImage,
    ConvertingColorSpace,
    /// `SAVING_AS_<FORMAT>`; holds the format name as requested.
    SavingAs(String),
    ConvertingToSvg,
    Saving,
    Success,
    Error(String),
    Traceback(String),
    UnknownCommand,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => f.write_str("PROCESSING"),
            Self::UpscalingStarted => f.write_str("UPSCALING_STARTED"),
            Self::ModelSelected(name) => write!(f, "MODEL_SELECTED:{name}"),
            Self::DetectedTransparentImage => f.write_str("DETECTED_TRANSPARENT_IMAGE"),
            Self::ExecutingUpscale => f.write_str("EXECUTING_UPSCALE"),
            Self::RestoringTransparency => f.write_str("RESTORING_TRANSPARENCY"),
            Self::UpscaleComplete => f.write_str("UPSCALE_COMPLETE"),
            Self::RemovingBg => f.write_str("REMOVING_BG"),
            Self::LoadingModel => f.write_str("LOADING_MODEL"),
            Self::RemovingBackground => f.write_str("REMOVING_BACKGROUND"),
            Self::ConvertingImage => f.write_str("CONVERTING_IMAGE"),
            Self::LoadingImage => f.write_str("LOADING_IMAGE"),
            Self::ConvertingColorSpace => f.write_str("CONVERTING_COLOR_SPACE"),
            Self::SavingAs(format) => write!(f, "SAVING_AS_{}", format.to_uppercase()),
            Self::ConvertingToSvg => f.write_str("CONVERTING_TO_SVG"),
            Self::Saving => f.write_str("SAVING"),
            Self::Success => f.write_str("SUCCESS"),
            Self::Error(message) => write!(f, "ERROR: {}", single_line(message)),
            Self::Traceback(diagnostic) => write!(f, "TRACEBACK: {}", single_line(diagnostic)),
            Self::UnknownCommand => f.write_str("UNKNOWN_COMMAND"),
        }
    }
}

/// Folds embedded line breaks (captured stderr, multi-line codec messages)
/// so a payload never spills onto a second protocol line.
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Writes status events, one per line, flushing after each so the reader
/// sees progress as it happens.
pub struct StatusWriter<W: Write> {
    sink: W,
}

impl<W: Write> StatusWriter<W> {
    pub const fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn emit(&mut self, status: Status) -> Result<()> {
        tracing::debug!(event = %status, "status");
        writeln!(self.sink, "{status}")
            .and_then(|()| self.sink.flush())
            .map_err(|e| BridgeError::file_system("status write", "<stdout>", e))
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl StatusWriter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}
