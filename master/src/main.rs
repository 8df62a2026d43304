use clap::Parser;
use master::network::{MasterConfig, MasterServer};
use master::registry::MemoryAddressBook;
use tokio::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// IP address to bind both endpoints to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port of the public endpoint
    #[clap(short, long, default_value = "3978")]
    port: u16,
    /// Port of the probe endpoint (0 picks an ephemeral port)
    #[clap(long, default_value = "0")]
    probe_port: u16,
    /// Frames per second
    #[clap(short, long, default_value = "1")]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = MasterConfig {
        public_addr: format!("{}:{}", args.host, args.port),
        probe_addr: format!("{}:{}", args.host, args.probe_port),
        tick_duration: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
    };

    let mut server = MasterServer::new(config, Box::new(MemoryAddressBook::new())).await?;
    server.run().await
}
