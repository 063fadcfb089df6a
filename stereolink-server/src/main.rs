//! stereolink-server — entry point.
//!
//! ```text
//! stereolink-server                   Run in the foreground
//! stereolink-server --config <path>   Load a custom config TOML
//! stereolink-server --gen-config      Write default config to stdout
//! stereolink-server --list-adapters   Print local IPv4 interfaces
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stereolink_core::StreamingServer;
use stereolink_server::config::ServerConfig;
use stereolink_server::pattern;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "stereolink-server", about = "stereolink stereo streaming server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "stereolink.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// List local network adapters a client could dial, then exit.
    #[arg(long)]
    list_adapters: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // --list-adapters: show dialable addresses and exit.
    if cli.list_adapters {
        for adapter in stereolink_core::list_adapters()? {
            println!("{}\t{}", adapter.name, adapter.ip_address);
        }
        return Ok(());
    }

    // Load config.
    let config = ServerConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("stereolink-server v{}", env!("CARGO_PKG_VERSION"));
    info!("listen: {}:{}", config.network.bind_addr, config.network.port);
    info!(
        "stream: {}x{}x{} quality {}",
        config.stream.width, config.stream.height, config.stream.depth, config.stream.quality
    );

    let server = Arc::new(StreamingServer::with_config(config.to_stream_config()));
    server.start().await?;

    // Feed the synthetic pattern until shutdown.
    let producer = tokio::spawn(pattern::run(
        Arc::clone(&server),
        config.stream.width,
        config.stream.height,
    ));

    tokio::signal::ctrl_c().await.ok();
    info!("Ctrl-C received — shutting down");

    producer.abort();
    server.stop().await?;

    Ok(())
}
