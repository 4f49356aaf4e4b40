//! OCPI service CLI
//!
//! ```sh
//! # Run with the default config (~/.config/ocpi-service/config.toml)
//! ocpi-service
//!
//! # Custom config path and port
//! ocpi-service --config /etc/ocpi-service/config.toml --port 8080
//!
//! # Validate the config without starting
//! ocpi-service --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use texnouz_ocpi::config::{default_config_path, AppConfig};
use texnouz_ocpi::server::{init_tracing, ServerHandle};

/// OCPI 2.2.1 roaming endpoint for a charging network.
#[derive(Parser, Debug)]
#[command(
    name = "ocpi-service",
    version,
    about = "OCPI 2.2.1 synchronization and protocol service",
    long_about = "Publishes a charging network over OCPI 2.2.1, keeps it in sync with \
                  network changes and routes remote commands between parties.\n\n\
                  Default config: ~/.config/ocpi-service/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPI_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let loaded = AppConfig::load(&config_path);

    if cli.check {
        let config = loaded?;
        let identity = config.local_identity()?;
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   Address     : {}", config.server.address());
        println!("   Public url  : {}", config.server.public_url);
        println!("   Identity    : {} ({})", identity.scope, identity.business_name);
        println!("   Parties     : {}", config.parties.len());
        println!("   Admin API   : {}", if config.admin_key_sha256().is_some() { "enabled" } else { "disabled" });
        return Ok(());
    }

    let mut config = match loaded {
        Ok(mut cfg) => {
            if let Some(ref level) = cli.log_level {
                cfg.logging.level = level.clone();
            }
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            let mut cfg = AppConfig::default();
            if let Some(ref level) = cli.log_level {
                cfg.logging.level = level.clone();
            }
            init_tracing(&cfg);
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            cfg
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(config).await?;
    handle.install_signal_handler();
    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
