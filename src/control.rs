//! Local control socket: line-oriented commands (`status`, `start <id>`,
//! `stop <id>`, `restart <id>`, `shutdown`) over a Unix domain socket.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::Supervisor;

pub async fn serve(socket_path: &Path, supervisor: Arc<Supervisor>) -> std::io::Result<()> {
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    info!("control socket listening at {}", socket_path.display());

    loop {
        let (stream, _) = listener.accept().await?;
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, supervisor).await {
                warn!("control client error: {e}");
            }
        });
    }
}

/// Handles exactly one command per connection: a `status` response can
/// span several lines, so the protocol closes the stream after writing the
/// response rather than staying open for a `read_line`-delimited reply.
async fn handle_client(stream: UnixStream, supervisor: Arc<Supervisor>) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    if let Some(line) = lines.next_line().await? {
        let response = execute(&line, &supervisor).await;
        write_half.write_all(response.as_bytes()).await?;
        write_half.shutdown().await?;
    }
    Ok(())
}

async fn execute(line: &str, supervisor: &Supervisor) -> String {
    let mut parts = line.trim().split_whitespace();
    match parts.next() {
        Some("status") => {
            let lines = supervisor.status().await;
            lines
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        }
        Some("start") => match parts.next() {
            Some(id) => match supervisor.start_one(id).await {
                Ok(()) => format!("started {id}"),
                Err(e) => format!("error: {e}"),
            },
            None => "error: start requires an id".to_string(),
        },
        Some("stop") => match parts.next() {
            Some(id) => match supervisor.stop_one(id).await {
                Ok(()) => format!("stopped {id}"),
                Err(e) => format!("error: {e}"),
            },
            None => "error: stop requires an id".to_string(),
        },
        Some("restart") => match parts.next() {
            Some(id) => match supervisor.restart_one(id).await {
                Ok(()) => format!("restarted {id}"),
                Err(e) => format!("error: {e}"),
            },
            None => "error: restart requires an id".to_string(),
        },
        Some("shutdown") => {
            supervisor.shutdown().await;
            "shutting down".to_string()
        }
        Some(other) => format!("error: unknown command '{other}'"),
        None => "error: empty command".to_string(),
    }
}

/// Client-side: send one line, read the (possibly multi-line) response
/// through to EOF, since the server closes the connection after replying.
pub async fn send_command(socket_path: &Path, command: &str) -> std::io::Result<String> {
    use tokio::io::AsyncReadExt;

    let stream = UnixStream::connect(socket_path).await?;
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(command.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.shutdown().await?;

    let mut reader = BufReader::new(read_half);
    let mut response = String::new();
    tokio::time::timeout(std::time::Duration::from_secs(10), async {
        reader.read_to_string(&mut response).await
    })
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "control socket timed out"))??;
    Ok(response.trim_end().to_string())
}
