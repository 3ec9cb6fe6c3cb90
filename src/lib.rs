pub mod config;
pub mod convert;
pub mod errors;
pub mod imageops_ai;
pub mod layout;
pub mod mocks;
#[cfg(feature = "rembg")]
pub mod model;
pub mod rembg;
pub mod status;
pub mod svg;
pub mod traits;
pub mod upscale;

use std::error::Error as _;
use std::io::Write;
use std::process::ExitCode;

use tracing::{info, warn};

pub use config::{Command, Config, Request};
pub use errors::{BridgeError, Result};
pub use layout::InstallLayout;
pub use status::{Status, StatusWriter};
pub use traits::*;

/// How an invocation ended, before it becomes a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Unrecognized command names exit 0, matching the existing callers.
    UnknownCommand,
}

impl Outcome {
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success | Self::UnknownCommand => 0,
            Self::Failure => 1,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        Self::from(outcome.exit_code())
    }
}

/// Runs exactly one request and owns the status protocol around it.
pub struct Bridge<W: Write> {
    layout: InstallLayout,
    status: StatusWriter<W>,
}

impl<W: Write> Bridge<W> {
    pub const fn new(layout: InstallLayout, status: StatusWriter<W>) -> Self {
        Self { layout, status }
    }

    pub fn run(&mut self, request: &Request) -> Outcome {
        info!(
            command = ?request.command,
            input = %request.input.display(),
            output = %request.output.display(),
            "dispatching"
        );

        let result = match &request.command {
            Command::Unknown(command) => {
                let err = BridgeError::UnknownCommand {
                    command: command.clone(),
                };
                warn!(kind = err.kind(), "{err}");
                return self.report_unknown();
            }
            Command::Upscale { model } => upscale::run(
                model,
                &request.input,
                &request.output,
                &self.layout,
                &mut self.status,
            ),
            Command::RemoveBackground => rembg::run(
                &request.input,
                &request.output,
                &self.layout,
                &mut self.status,
            ),
            Command::Convert { format } => {
                convert::run(format, &request.input, &request.output, &mut self.status)
            }
            Command::ConvertToSvg => svg::run(&request.input, &request.output, &mut self.status),
        };

        match result.and_then(|()| self.status.emit(Status::Success)) {
            Ok(()) => Outcome::Success,
            Err(err) => self.report_failure(&err),
        }
    }

    fn report_unknown(&mut self) -> Outcome {
        if let Err(err) = self.status.emit(Status::UnknownCommand) {
            warn!(error = %err, "could not report unknown command");
        }
        Outcome::UnknownCommand
    }

    fn report_failure(&mut self, err: &BridgeError) -> Outcome {
        warn!(kind = err.kind(), error = %err, "operation failed");
        let lines = [
            Status::Error(message(err)),
            Status::Traceback(diagnostic(err)),
        ];
        for line in lines {
            if let Err(write_err) = self.status.emit(line) {
                warn!(error = %write_err, "could not report failure");
                break;
            }
        }
        Outcome::Failure
    }

    pub fn into_status(self) -> StatusWriter<W> {
        self.status
    }
}

/// The error and its immediate cause. Library errors already render their
/// own inner errors, so deeper causes are left to [`diagnostic`].
pub fn message(err: &BridgeError) -> String {
    match err.source() {
        Some(cause) => format!("{err}: {cause}"),
        None => err.to_string(),
    }
}

/// `<kind>: <message> | caused by: <source> | ...` over the whole source chain.
pub fn diagnostic(err: &BridgeError) -> String {
    let mut text = format!("{}: {err}", err.kind());
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(" | caused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
