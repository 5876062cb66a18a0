//! Control CLI for the fleet supervisor, talking to its Unix control
//! socket. Mirrors the status/start/stop/restart/shutdown/logs command set.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use zap_empire::{control, control_socket_path, manifest::find_project_dir};

#[derive(Parser)]
struct Cli {
    #[arg(long)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Status,
    Start { id: String },
    Stop { id: String },
    Restart { id: String },
    Shutdown,
    /// Tail a child's stdout log.
    Logs { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let project_dir = cli
        .project_dir
        .or_else(|| find_project_dir(&std::env::current_dir()?))
        .ok_or_else(|| anyhow::anyhow!("no project directory found (no config/agents.json in any parent)"))?;

    let socket_path = control_socket_path(&project_dir);

    match cli.command {
        Command::Status => {
            let resp = control::send_command(&socket_path, "status").await?;
            println!("{resp}");
        }
        Command::Start { id } => {
            let resp = control::send_command(&socket_path, &format!("start {id}")).await?;
            println!("{resp}");
        }
        Command::Stop { id } => {
            let resp = control::send_command(&socket_path, &format!("stop {id}")).await?;
            println!("{resp}");
        }
        Command::Restart { id } => {
            let resp = control::send_command(&socket_path, &format!("restart {id}")).await?;
            println!("{resp}");
        }
        Command::Shutdown => {
            println!("shutting down the entire fleet. continue? [y/N]");
            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer)?;
            if answer.trim().eq_ignore_ascii_case("y") {
                let resp = control::send_command(&socket_path, "shutdown").await?;
                println!("{resp}");
            } else {
                println!("aborted");
            }
        }
        Command::Logs { id } => {
            let log_path = project_dir
                .join("data")
                .join("system-master")
                .join("logs")
                .join(format!("{id}.stdout.log"));
            let status = std::process::Command::new("tail")
                .arg("-f")
                .arg(&log_path)
                .status()?;
            std::process::exit(status.code().unwrap_or(1));
        }
    }

    Ok(())
}
