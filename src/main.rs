//! Sync Hub - Binary Entry Point

use std::process::ExitCode;

use tracing::error;

use sync_hub::api::serve;
use sync_hub::logging::init_logger;
use sync_hub::{CursorBoard, HubConfig, ModelKind, TodoList};

#[tokio::main]
async fn main() -> ExitCode {
    init_logger();

    let config = match HubConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let result = match config.model {
        ModelKind::Cursors => serve(CursorBoard, config).await,
        ModelKind::Todos => serve(TodoList, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "sync hub failed");
            ExitCode::FAILURE
        }
    }
}
