//! ferrochat binary entry point

use ferrochat::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Parse CLI flags (--config, --log-level)
/// 2. Initialize tracing/logging
/// 3. Load configuration
/// 4. Initialize AppState and metrics
/// 5. Start background tasks and serve until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_args()?;

    let default_filter = cli
        .log_level
        .clone()
        .map(|level| format!("ferrochat={level},tower_http=warn"))
        .unwrap_or_else(|| "ferrochat=info,tower_http=warn".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let log_format = std::env::var("FERROCHAT__LOGGING__FORMAT")
        .unwrap_or_else(|_| "pretty".to_string());
    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting ferrochat...");

    ferrochat::metrics::init_metrics();

    let config = config::AppConfig::load(cli.config_path.as_deref())?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    let state = AppState::new(config.clone()).await?;

    let app = ferrochat::build_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    state.start_background_tasks();

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            tracing::info!("Shutdown signal received, draining...");
            shutdown_state.shutdown().await;

            // In-flight requests get a bounded drain window.
            let grace = shutdown_state.config.server.shutdown_grace_seconds;
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(grace)).await;
                tracing::warn!("Drain deadline exceeded, forcing exit");
                std::process::exit(0);
            });
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

struct CliArgs {
    config_path: Option<String>,
    log_level: Option<String>,
}

/// Parse `--config <path>` and `--log-level <level>`.
fn parse_args() -> Result<CliArgs, Box<dyn std::error::Error>> {
    let mut config_path = None;
    let mut log_level = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = Some(args.next().ok_or("--config requires a path")?);
            }
            "--log-level" | "-l" => {
                let level = args.next().ok_or("--log-level requires a level")?;
                match level.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "critical" | "off" => {}
                    other => return Err(format!("unknown log level: {other}").into()),
                }
                // tracing has no "critical"; map it to error.
                log_level = Some(if level == "critical" {
                    "error".to_string()
                } else {
                    level
                });
            }
            "--help" | "-h" => {
                println!(
                    "ferrochat - instant messaging server\n\n\
                     Usage: ferrochat [--config <path>] [--log-level <trace|debug|info|warn|error|critical|off>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }

    Ok(CliArgs {
        config_path,
        log_level,
    })
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
