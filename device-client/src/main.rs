//! # Mise Device Client CLI
//!
//! Command-line tool for scale operations:
//! - Register the scale with the config service
//! - Show the stored identity
//! - Read or replace the scale's configuration
//! - Read or set the scale's address
//!
//! ## Usage
//!
//! ```bash
//! export AUTH_TOKEN=your_secret_token
//!
//! # Register a new scale
//! device-client register --model IchibuV1 --config scale.json
//!
//! # Show the stored identity
//! device-client show
//!
//! # Fetch the configuration, skipping the cache
//! device-client config get --refresh
//!
//! # Publish the address the scale listens on
//! device-client address put 192.168.1.100:9000
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use device_client::{DeviceRegistrar, LocalStorage};
use shared::{
    config::DeviceClientConfig, constants::ENV_DEVICE_STORAGE_PATH, Configuration, DeviceModel,
};

/// Storage directory under the home directory when nothing else is set
const DEVICE_STORAGE_DIR: &str = ".mise-device";

#[derive(Parser)]
#[command(name = "device-client")]
#[command(about = "Mise scale client for the device configuration directory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config service URL (overrides MISE_SERVICE_URL)
    #[arg(long)]
    service_url: Option<String>,

    /// Directory holding the device identity (overrides MISE_DEVICE_STORAGE)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Disable the configuration cache
    #[arg(long)]
    no_cache: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this scale with the config service
    Register {
        /// Device model (IchibuV1, IchibuV2, LibraV0)
        #[arg(long, short = 'm')]
        model: String,

        /// JSON file with the initial configuration
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Discard an existing identity and register again
        #[arg(long)]
        force: bool,
    },

    /// Show the stored device identity
    Show,

    /// Read or replace the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Read or set the address
    Address {
        #[command(subcommand)]
        action: AddressAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Get {
        /// Bypass the local cache
        #[arg(long)]
        refresh: bool,
    },

    /// Replace the configuration with the contents of a JSON file
    Put {
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum AddressAction {
    /// Print the current address
    Get,

    /// Set a new address
    Put {
        /// Network locator, e.g. 192.168.1.100:9000
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    // Build config
    let mut config = DeviceClientConfig::from_env()?;
    if let Some(url) = cli.service_url {
        config.service_url = url;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_path = dir;
    } else if std::env::var_os(ENV_DEVICE_STORAGE_PATH).is_none() {
        if let Some(home) = dirs::home_dir() {
            config.storage.data_path = home.join(DEVICE_STORAGE_DIR);
        }
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }

    match cli.command {
        Commands::Register { model, config: file, force } => {
            register_device(&config, &model, &file, force).await?;
        }
        Commands::Show => {
            show_identity(&config).await?;
        }
        Commands::Config { action } => {
            let registrar = DeviceRegistrar::new(&config).await?;
            match action {
                ConfigAction::Get { refresh } => {
                    let current = registrar.configuration(refresh).await?;
                    println!("{}", serde_json::to_string_pretty(&*current)?);
                }
                ConfigAction::Put { config: file } => {
                    let new_config = read_configuration(&file).await?;
                    let message = registrar.update_configuration(&new_config).await?;
                    println!("\n✓ {}", message);
                }
            }
        }
        Commands::Address { action } => {
            let registrar = DeviceRegistrar::new(&config).await?;
            match action {
                AddressAction::Get => println!("{}", registrar.address().await?),
                AddressAction::Put { address } => {
                    let message = registrar.update_address(&address).await?;
                    println!("\n✓ {}", message);
                }
            }
        }
    }

    Ok(())
}

async fn read_configuration(path: &Path) -> Result<Configuration> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(Configuration::from_json(value)?)
}

async fn register_device(config: &DeviceClientConfig, model: &str, file: &Path, force: bool) -> Result<()> {
    info!("Registering device...");

    let model: DeviceModel = model.parse()?;
    let initial = read_configuration(file).await?;

    let mut registrar = DeviceRegistrar::new(config).await?;

    if registrar.is_registered() && !force {
        println!("Device already registered!");
        if let Some(identity) = registrar.identity() {
            println!("Identity: {}", identity);
        }
        println!("\nUse '--force' to register with a new identity.");
        return Ok(());
    }

    let identity = if force {
        registrar.re_register(model, &initial).await?
    } else {
        registrar.register(model, &initial).await?
    };

    println!("\n✓ Device registered successfully!");
    println!("  Model: {}", identity.model);
    println!("  Serial: {}", identity.serial);

    Ok(())
}

async fn show_identity(config: &DeviceClientConfig) -> Result<()> {
    let storage = LocalStorage::new(&config.storage).await?;

    if let Some(record) = storage.record() {
        println!("\nDevice Identity:");
        println!("  Model: {}", record.identity.model);
        println!("  Serial: {}", record.identity.serial);
        println!("  Registered: {}", record.registered_at);
        println!("  Storage: {}", storage.path().display());
    } else {
        println!("\nNo device identity found.");
        println!("Run 'device-client register' to register this device.");
    }

    Ok(())
}
