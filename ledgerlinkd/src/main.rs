use std::sync::Arc;

use anyhow::Context;
use ledgerlinkd::api::{AppState, app_router};
use ledgerlinkd::config::ServerConfig;
use ledgerlinkd::logging::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const USAGE: &str = "Usage: ledgerlinkd [--port <PORT>] [--help]
  Configuration is read from the environment and an optional .env file.
  --port overrides APP_PORT.";

/// Command-line overrides layered on top of the environment.
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    show_help: bool,
    port: Option<u16>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter().skip(1);
        while let Some(arg) = args.next() {
            let port = if let Some(value) = arg.strip_prefix("--port=") {
                value.to_string()
            } else if arg == "--port" {
                args.next().context("--port needs a value")?
            } else if arg == "--help" || arg == "-h" {
                parsed.show_help = true;
                continue;
            } else {
                anyhow::bail!("unexpected argument {arg:?}\n{USAGE}");
            };
            let port = port
                .parse()
                .with_context(|| format!("invalid --port value {port:?}"))?;
            parsed.port = Some(port);
        }
        Ok(parsed)
    }

    fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.listen_addr.set_port(port);
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                warn!(error = %err, "failed waiting for shutdown signal");
                return shutdown.cancelled().await;
            }
            info!("shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = CliArgs::parse(std::env::args())?;
    if cli.show_help {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = ServerConfig::from_env().context("failed to read configuration")?;
    cli.apply(&mut config);
    init_tracing();

    let listen_addr = config.listen_addr;
    let shutdown = CancellationToken::new();
    let state =
        AppState::new(config, shutdown.clone()).context("failed to build provider clients")?;
    let router = app_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!(%listen_addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;
    info!("stopped");
    Ok(())
}
