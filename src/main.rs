use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_bridge::{Bridge, Config, InstallLayout, Request, StatusWriter};

fn main() -> ExitCode {
    let config = Config::parse();

    // stdout carries the status protocol, so diagnostics go to stderr.
    let log_level = if config.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("image_bridge={log_level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let layout =
        InstallLayout::discover(config.root.clone()).with_rembg_model(config.rembg_model.clone());
    tracing::debug!(root = %layout.root().display(), "install layout");

    let request = Request::from(&config);
    Bridge::new(layout, StatusWriter::stdout())
        .run(&request)
        .into()
}
