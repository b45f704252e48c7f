// ============================================
// File: crates/callhome-server/src/main.rs
// ============================================
//! # Call-Home Server Entry Point
//!
//! ## Creation Reason
//! Operator tooling for the call-home gateway: configuration checks, vault
//! key management and credential sealing. The listener itself is embedded
//! by the transport layer through the library API.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration validation
//! - Vault key generation and password sealing
//! - Host key inspection
//!
//! ## Usage
//! ```bash
//! # Step 1: Create the vault key
//! callhome-server keygen --out /etc/callhome/vault.key
//!
//! # Step 2: Seal plaintext passwords in the config
//! callhome-server seal --config /etc/callhome/server.toml
//!
//! # Other commands
//! callhome-server validate                        # Validate config file
//! callhome-server host-key --ed25519 <base64>     # authorized_keys line
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The vault key file is written with mode 0600; keep it that way
//! - `seal` rewrites the config file in place; comments are not preserved
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use callhome_core::{AeadVault, HostKey, VaultKey};
use callhome_server::ServerConfig;

// ============================================
// CLI Definition
// ============================================

/// Call-home device gateway
///
/// Quick Start:
///   1. Run: callhome-server keygen
///   2. Add devices to the config, then run: callhome-server seal
///   3. Run: callhome-server validate
#[derive(Parser, Debug)]
#[command(name = "callhome-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/callhome/server.toml")]
        config: PathBuf,
    },

    /// Generate a credential vault key
    Keygen {
        /// Output path of the key file
        #[arg(short, long, default_value = "/etc/callhome/vault.key")]
        out: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Encrypt plaintext passwords in the configuration file
    Seal {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/callhome/server.toml")]
        config: PathBuf,
    },

    /// Print the authorized_keys line and fingerprint of a device key
    HostKey {
        /// Raw 32-byte Ed25519 public key, base64
        #[arg(long)]
        ed25519: String,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging("info");

    let result = match cli.command {
        Commands::Validate { config } => cmd_validate(config).await,
        Commands::Keygen { out, force } => cmd_keygen(out, force).await,
        Commands::Seal { config } => cmd_seal(config).await,
        Commands::HostKey { ed25519 } => cmd_host_key(&ed25519),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    let config = ServerConfig::load(&config_path).await?;
    init_logging(&config.logging.level);

    println!("✅ Configuration is valid");
    println!();
    println!("Network:");
    println!("   Host:       {}", config.network.host);
    println!("   SSH Port:   {}", config.network.ssh_port);
    println!("   TLS Port:   {}", config.network.tls_port);
    println!();
    println!("Policy:");
    match &config.global {
        Some(global) => {
            println!("   Accept Unknown Keys:  {}", global.accept_all_unknown_keys);
            println!(
                "   Naming Strategy:      {:?}",
                global.naming_strategy.unwrap_or_default()
            );
            println!(
                "   Global Credentials:   {}",
                if global.credentials.is_some() { "yes" } else { "no" }
            );
        }
        None => println!("   (none, unknown keys are rejected)"),
    }
    println!();
    println!("Allowed Devices:  {}", config.allowed_devices.len());
    for device in &config.allowed_devices {
        let key = match device.decoded_host_key() {
            Some(Ok(key)) => key.fingerprint(),
            Some(Err(_)) => "<invalid>".to_string(),
            None => "<no host key>".to_string(),
        };
        println!("   {:<24} {}", device.unique_id, key);
    }
    println!();

    if Path::new(&config.vault.key_file).exists() {
        load_vault_key(Path::new(&config.vault.key_file)).await?;
        println!("Vault Key:  ✅ Valid");
    } else {
        println!("Vault Key:  ❌ Missing ({})", config.vault.key_file);
    }

    Ok(())
}

/// Generates a vault key file.
async fn cmd_keygen(out: PathBuf, force: bool) -> anyhow::Result<()> {
    if out.exists() && !force {
        anyhow::bail!(
            "key file {} already exists; use --force to overwrite",
            out.display()
        );
    }

    info!("Generating vault key...");
    save_vault_key(&VaultKey::generate(), &out).await?;
    println!("✅ Vault key written to {}", out.display());
    Ok(())
}

/// Seals plaintext passwords in place.
async fn cmd_seal(config_path: PathBuf) -> anyhow::Result<()> {
    let mut config = ServerConfig::load(&config_path).await?;
    let key = load_vault_key(Path::new(&config.vault.key_file)).await?;
    let vault = AeadVault::new(key);

    let changed = config.seal_credentials(&vault)?;
    if changed == 0 {
        println!("All passwords are already sealed");
        return Ok(());
    }

    config.save(&config_path).await?;
    println!(
        "✅ Sealed {} credential set(s) in {}",
        changed,
        config_path.display()
    );
    Ok(())
}

/// Prints the authorized_keys form of an Ed25519 key.
fn cmd_host_key(ed25519: &str) -> anyhow::Result<()> {
    let bytes = BASE64.decode(ed25519.trim())?;
    let key = HostKey::from_ed25519_bytes(&bytes)?;
    println!("{}", key.encode());
    println!("{}", key.fingerprint());
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads a vault key from a JSON key file.
async fn load_vault_key(path: &Path) -> anyhow::Result<VaultKey> {
    let content = tokio::fs::read_to_string(path).await?;
    let key_file: KeyFile = serde_json::from_str(&content)?;
    if key_file.algorithm != KEY_ALGORITHM {
        anyhow::bail!("unsupported vault key algorithm: {}", key_file.algorithm);
    }
    Ok(VaultKey::from_base64(&key_file.key)?)
}

/// Saves a vault key to a JSON key file.
async fn save_vault_key(key: &VaultKey, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let key_file = KeyFile {
        version: "1.0".to_string(),
        algorithm: KEY_ALGORITHM.to_string(),
        key: key.to_base64(),
        created_at: timestamp(),
    };

    let content = serde_json::to_string_pretty(&key_file)?;
    tokio::fs::write(path, content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

/// Returns current Unix time as a `<secs>Z` string.
fn timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}Z", duration.as_secs())
}

const KEY_ALGORITHM: &str = "chacha20poly1305";

/// Vault key file format.
#[derive(serde::Serialize, serde::Deserialize)]
struct KeyFile {
    version: String,
    algorithm: String,
    key: String,
    created_at: String,
}
