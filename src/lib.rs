pub mod bootstrap;
pub mod cli;
pub mod codec;
pub mod config;
pub mod enhance;
pub mod error;
pub mod generation;
pub mod identity;
pub mod logging;
pub mod notification;
pub mod projection;
pub mod prompt;
pub mod session;
pub mod store;
#[cfg(test)]
mod test_support;
pub use error::{AppError, AppResult};

use std::process::ExitCode;

use clap::Parser;

/// Entrypoint used by the binary: parse arguments, load config and run one
/// command on a single-threaded runtime.
pub fn run() -> anyhow::Result<ExitCode> {
    let args = cli::RootArgs::parse();
    logging::init();
    tracing::info!("starting VibeCode");

    let config = config::load_app_config();
    let env = config::EnvOverrides::from_env();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let app = bootstrap::bootstrap_app_runtime(config, &env)?;
        cli::execute(args, app).await
    })
}
