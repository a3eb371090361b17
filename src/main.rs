// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sideload::origin::Origin;
use sideload::packages::{DecoderSet, decode_file};
use sideload::server::{ServerConfig, SideloadConfig};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "sideload")]
#[command(author, version, about = "Internal app-distribution store with OTA installs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Listen address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
        /// Storage root directory (overrides config)
        #[arg(short, long)]
        root: Option<PathBuf>,
        /// External base URL used in generated links (overrides config)
        #[arg(long)]
        public_url: Option<String>,
        /// Allow deleting packages through the API
        #[arg(long)]
        enable_delete: bool,
    },
    /// Decode a package and print its metadata
    Inspect {
        /// Path to an .ipa or .apk file
        package_path: PathBuf,
    },
}

fn server_config(
    config: Option<PathBuf>,
    bind: Option<String>,
    root: Option<PathBuf>,
    public_url: Option<String>,
    enable_delete: bool,
) -> Result<ServerConfig> {
    let file = match config {
        Some(path) => SideloadConfig::load(&path)?,
        None => SideloadConfig::default(),
    };
    let mut config = file.to_server_config()?;

    if let Some(bind) = bind {
        config.bind_addr = bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", bind))?;
    }
    if let Some(root) = root {
        config.storage_root = root;
    }
    if let Some(url) = public_url {
        config.public_origin =
            Some(Origin::parse(&url).with_context(|| format!("Invalid public URL: {}", url))?);
    }
    if enable_delete {
        config.enable_delete = true;
    }
    Ok(config)
}

fn inspect(path: &Path) -> Result<()> {
    let metadata = decode_file(path, &DecoderSet::default())
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    println!("Format:     {}", metadata.format.name());
    println!("Name:       {}", metadata.display_name());
    println!("Identifier: {}", metadata.identifier);
    println!("Version:    {}", metadata.version);
    println!("Build:      {}", metadata.build);
    if let Some(channel) = &metadata.channel {
        println!("Channel:    {}", channel);
    }
    println!("Size:       {} bytes", metadata.size);
    match &metadata.icon {
        Some(Ok(bytes)) => println!("Icon:       {} bytes", bytes.len()),
        Some(Err(e)) => println!("Icon:       unreadable ({})", e),
        None => println!("Icon:       none"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            root,
            public_url,
            enable_delete,
        } => {
            let config = server_config(config, bind, root, public_url, enable_delete)?;
            sideload::server::run_server(config).await
        }
        Commands::Inspect { package_path } => {
            info!("Inspecting package: {}", package_path.display());
            inspect(&package_path)
        }
    }
}
