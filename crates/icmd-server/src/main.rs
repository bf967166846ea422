use std::path::PathBuf;

use clap::Parser;
use icmd_core::settings::{self, Settings};
use icmd_server::{router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "icmd-server", version, about = "ICMD tag and hierarchy HTTP API")]
struct Args {
    /// Port to listen on (overrides settings.json)
    #[arg(long)]
    port: Option<u16>,
    /// Address to bind (overrides settings.json)
    #[arg(long)]
    bind: Option<String>,
    /// Directory holding the project documents
    #[arg(long, env = "ICMD_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Write the effective settings back to settings.json before serving
    #[arg(long)]
    save_settings: bool,
}

impl Args {
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(bind) = &self.bind {
            settings.bind_address = bind.clone();
        }
        if let Some(dir) = &self.data_dir {
            settings.data_dir = Some(dir.clone());
        }
        settings
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = args.apply(settings::read_settings());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    if args.save_settings {
        settings::write_settings(&settings)?;
        info!(path = %settings::settings_path().display(), "saved settings");
    }

    let store = settings.store();
    info!(data_dir = %store.root().display(), "using project store");

    let app = router(AppState::new(store));
    let listener =
        tokio::net::TcpListener::bind((settings.bind_address.as_str(), settings.port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
