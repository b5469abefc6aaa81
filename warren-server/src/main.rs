//! Warren hub server binary.
//!
//! Thin entry point: argument parsing, logger setup, then the hub event
//! loop from `warren-collab`.

use std::path::PathBuf;

use clap::Parser;
use warren_collab::server::{GridServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "warren-server", about = "Collaborative maze grid hub")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9090")]
    bind: String,

    /// Grid width for newly created sessions
    #[arg(long, default_value_t = 34)]
    width: u32,

    /// Grid height for newly created sessions
    #[arg(long, default_value_t = 25)]
    height: u32,

    /// Durable cell store directory (omit for in-memory only)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: args.bind,
        grid_width: args.width,
        grid_height: args.height,
        storage_path: args.data_dir,
        ..ServerConfig::default()
    };

    let server = GridServer::new(config);
    log::info!(
        "starting warren hub on {} ({}x{} sessions, persistence: {})",
        server.bind_addr(),
        args.width,
        args.height,
        if server.store().is_some() { "on" } else { "off" },
    );
    server.run().await
}
