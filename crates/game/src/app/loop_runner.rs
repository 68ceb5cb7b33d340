use std::process::ExitCode;

use bow_engine::run_app;
use tracing::{error, info};

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    if let Err(err) = run_app(app.config, Box::new(app.store), Box::new(app.director)) {
        error!(error = %err, "run_failed");
        return ExitCode::FAILURE;
    }

    info!("=== OldBow exited ===");
    ExitCode::SUCCESS
}
