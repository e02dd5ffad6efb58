//! Process entry point: reads one JSON configuration document from stdin,
//! runs the requested import or export, and exits with 0 on success, 130 on
//! user-requested cancellation, and 1 on any other failure.

use std::io::Read;

use tokio_util::sync::CancellationToken;

use datamill::{run_export, run_import, Config, Mode};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        log::error!("failed to read configuration: {e}");
        return 1;
    }

    let mut config: Config = match serde_json::from_str(&input) {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to parse configuration: {e}");
            return 1;
        }
    };
    if let Err(e) = config.validate() {
        log::error!("invalid configuration: {e}");
        return 1;
    }
    if let Err(e) = config.normalize() {
        log::error!("configuration normalization failed: {e}");
        return 1;
    }

    log::info!("mode: {}", mode_name(config.mode));
    log::info!("workers: {}", config.workers);
    log::info!("batch size: {}", config.batch_size);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            log::warn!("received shutdown signal, initiating graceful shutdown");
            cancel.cancel();
        });
    }

    let result = match config.mode {
        Mode::Import => run_import(&config, &cancel).await,
        Mode::Export => run_export(&config, &cancel).await,
    };

    match result {
        Ok(_) => {
            log::info!("operation completed successfully");
            0
        }
        Err(e) if e.is_cancelled() => {
            log::info!("operation cancelled, shutting down gracefully");
            130
        }
        Err(e) => {
            log::error!("operation failed: {}", render_chain(&e));
            1
        }
    }
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Import => "import",
        Mode::Export => "export",
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Render the error with its cause chain on one line.
fn render_chain(err: &dyn std::error::Error) -> String {
    let mut line = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        line.push_str(": ");
        line.push_str(&cause.to_string());
        source = cause.source();
    }
    line
}
