use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_UPSCALE_MODEL: &str = "realesrgan-x4plus";
pub const DEFAULT_FORMAT: &str = "png";

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Operation to perform: upscale, rembg or convert
    pub command: String,

    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: PathBuf,

    /// Upscaling model name (upscale only)
    #[arg(long, default_value = DEFAULT_UPSCALE_MODEL)]
    pub model: String,

    /// Target format (convert only): png, jpg, jpeg, webp, bmp, gif or svg
    #[arg(long, default_value = DEFAULT_FORMAT)]
    pub format: String,

    /// Installation root holding the bundled tools under `utils/`
    #[arg(long, env = "IMAGE_BRIDGE_ROOT")]
    pub root: Option<PathBuf>,

    /// Background removal model file, overriding the bundled one
    #[arg(long, env = "IMAGE_BRIDGE_REMBG_MODEL")]
    pub rembg_model: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

/// The operation selected by the command name (and, for convert, the format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upscale { model: String },
    RemoveBackground,
    Convert { format: String },
    ConvertToSvg,
    Unknown(String),
}

impl Command {
    pub fn resolve(command: &str, model: &str, format: &str) -> Self {
        match command {
            "upscale" => Self::Upscale {
                model: model.to_string(),
            },
            "rembg" | "remove-background" => Self::RemoveBackground,
            "convert" if format.eq_ignore_ascii_case("svg") => Self::ConvertToSvg,
            "convert" => Self::Convert {
                format: format.to_string(),
            },
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A single invocation's worth of work; built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Request {
    pub fn new(command: Command, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            command,
            input: input.into(),
            output: output.into(),
        }
    }
}

impl From<&Config> for Request {
    fn from(config: &Config) -> Self {
        Self::new(
            Command::resolve(&config.command, &config.model, &config.format),
            &config.input,
            &config.output,
        )
    }
}
