use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use plexrelay::{config, library::PlexClient, server, streaming, transcode::Supervisor};

#[derive(Parser)]
#[command(name = "plexrelay", about = "On-demand HLS relay for a Plex media library")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the streaming server
    Start {
        /// Override the listen host
        #[arg(long)]
        host: Option<String>,

        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load the configuration from the environment and print a summary
    Validate,
    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults based on the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "plexrelay=trace,tower_http=debug".to_string()
        } else {
            "plexrelay=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port))
        }
        Commands::Validate => validate_config(),
        Commands::Version => {
            println!("plexrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = config::load_from_env().context("configuration error")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting plexrelay");
    tracing::info!(
        "Provider: {:?}, cache dir: {}",
        config.streaming.provider,
        config.streaming.cache_dir.display()
    );

    tokio::fs::create_dir_all(&config.streaming.cache_dir)
        .await
        .context("failed to create cache directory")?;

    let library = Arc::new(PlexClient::new(&config.library));
    let supervisor = Arc::new(Supervisor::new(
        config.encoder.ffmpeg_path.clone(),
        config.encoder.grace,
    ));
    let provider = streaming::build_provider(&config, Arc::clone(&library), Arc::clone(&supervisor));

    server::start_server(&config, provider, library, supervisor).await
}

fn validate_config() -> Result<()> {
    let config = config::load_from_env().context("configuration error")?;
    println!("Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Library: {}", config.library.base_url);
    println!("  Provider: {:?}", config.streaming.provider);
    println!("  Cache dir: {}", config.streaming.cache_dir.display());
    println!(
        "  Segment duration: {}s, window: {} segments",
        config.streaming.segment_duration, config.streaming.window_segments
    );
    println!("  Encoder: {}", config.encoder.ffmpeg_path.display());
    println!(
        "  Codecs: video={}, audio={}",
        config.encoder.video_codec, config.encoder.audio_codec
    );
    Ok(())
}
