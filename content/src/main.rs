//! Content-delivery service: a thin TCP wrapper that serves files from
//! a configured root directory. Each connection sends one request line
//! naming a file; the file is streamed back and the connection closed.

use clap::Parser;
use log::{info, warn};
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value = "3980")]
    port: u16,
    /// Directory the served files live in
    #[clap(short, long, default_value = "content")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let listener = TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;
    info!(
        "Content server listening on {}, serving {}",
        listener.local_addr()?,
        args.root.display()
    );

    loop {
        let (stream, addr) = listener.accept().await?;
        let root = args.root.clone();

        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, &root).await {
                warn!("Connection from {} failed: {}", addr, e);
            }
        });
    }
}

async fn serve_connection(stream: TcpStream, root: &Path) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request = String::new();
    reader.read_line(&mut request).await?;

    let mut stream = reader.into_inner();
    match resolve(root, request.trim()) {
        Some(path) => {
            let data = tokio::fs::read(&path).await?;
            stream.write_all(&data).await?;
        }
        None => {
            stream.write_all(b"ERR\n").await?;
        }
    }
    stream.shutdown().await
}

/// Maps a request line onto a file under the root, rejecting anything
/// that tries to climb out of it.
fn resolve(root: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let relative = Path::new(name);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Some(root.join(relative))
    } else {
        None
    }
}
