//! Entry point for the fleet supervisor process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;

use zap_empire::manifest::Manifest;
use zap_empire::{control, control_socket_path, Supervisor};

#[derive(Parser)]
struct Args {
    /// Project root containing config/agents.json. Defaults to the current directory.
    #[arg(long)]
    project_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let project_dir = args
        .project_dir
        .or_else(|| zap_empire::manifest::find_project_dir(&std::env::current_dir()?))
        .unwrap_or_else(|| PathBuf::from("."));

    let manifest_path = project_dir.join("config").join("agents.json");
    let manifest = Manifest::load(&manifest_path)?;
    let data_dir = project_dir.join("data").join("system-master");
    std::fs::create_dir_all(&data_dir)?;

    let supervisor = Arc::new(Supervisor::new(manifest, data_dir));
    supervisor.start_all().await?;
    info!("fleet started");

    let socket_path = control_socket_path(&project_dir);
    let control_supervisor = Arc::clone(&supervisor);
    let control_handle = tokio::spawn(async move {
        if let Err(e) = control::serve(&socket_path, control_supervisor).await {
            log::error!("control socket error: {e}");
        }
    });

    tokio::select! {
        _ = supervisor.monitor_loop() => {},
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down fleet");
            supervisor.shutdown().await;
        }
        _ = control_handle => {},
    }

    Ok(())
}
