//! dead - command line client for a dead-drop host.
//!
//! Drops encrypted files on the remote and pulls them back, authenticating
//! with a registered RSA key pair.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use deaddrop_client::{gen_key, ClientConfig, DeadDropClient, HttpTransport};
use deaddrop_crypto::RSA_KEY_BITS;

#[derive(Parser)]
#[command(name = "dead")]
#[command(about = "Encrypted dead-drop object exchange")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.dead-drop/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    remote: RemoteArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that override the config file.
#[derive(Args)]
struct RemoteArgs {
    /// Base URL of the dead-drop host.
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Private key used to authenticate.
    #[arg(long, global = true)]
    private_key: Option<PathBuf>,

    /// Name the public key is registered under.
    #[arg(long, global = true)]
    key_name: Option<String>,

    /// Symmetric key shared with the other party.
    #[arg(long, global = true)]
    encryption_key: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[arg(long, global = true)]
    insecure_skip_verify: bool,
}

impl RemoteArgs {
    fn into_config(self) -> ClientConfig {
        ClientConfig {
            remote: self.remote,
            private_key: self.private_key,
            key_name: self.key_name,
            encryption_key: self.encryption_key,
            insecure_skip_verify: self.insecure_skip_verify,
            request_timeout_secs: None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file and upload it; prints the object reference.
    Drop {
        /// File to drop.
        file: PathBuf,
    },

    /// Download, verify and decrypt an object.
    Pull {
        /// Object reference printed by `drop` (`<id>:<checksum>`).
        object: String,

        /// Where to write the decrypted file.
        dest: PathBuf,
    },

    /// Register another public key with the remote.
    AddKey {
        /// PEM encoded RSA public key.
        public_key: PathBuf,

        /// Name to register the key under.
        name: String,
    },

    /// Generate an RSA key pair for authentication.
    GenKey {
        /// Where to write the private key.
        private_key: PathBuf,

        /// Where to write the public key.
        public_key: PathBuf,

        /// Key size in bits.
        #[arg(long, default_value_t = RSA_KEY_BITS)]
        bits: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Drop { file } => {
            let config = load_config(cli.config.as_deref(), cli.remote)?;
            cmd_drop(config, &file).await
        }

        Commands::Pull { object, dest } => {
            let config = load_config(cli.config.as_deref(), cli.remote)?;
            cmd_pull(config, &object, &dest).await
        }

        Commands::AddKey { public_key, name } => {
            let config = load_config(cli.config.as_deref(), cli.remote)?;
            cmd_add_key(config, &public_key, &name).await
        }

        Commands::GenKey {
            private_key,
            public_key,
            bits,
        } => cmd_gen_key(&private_key, &public_key, bits).await,
    }
}

/// Config file values overridden by command-line flags.
fn load_config(path: Option<&Path>, overrides: RemoteArgs) -> Result<ClientConfig> {
    let config = ClientConfig::load(path).context("Failed to load configuration")?;
    Ok(config.merge(overrides.into_config()))
}

fn connect(config: ClientConfig) -> Result<DeadDropClient<HttpTransport>> {
    DeadDropClient::connect(config).context("Failed to set up remote connection")
}

/// Drop a file on the remote.
async fn cmd_drop(config: ClientConfig, file: &Path) -> Result<()> {
    let client = connect(config)?;
    let reference = client
        .drop_file(file)
        .await
        .with_context(|| format!("Failed to drop '{}'", file.display()))?;

    println!("Dropped {} -> {}", file.display(), reference);
    Ok(())
}

/// Pull an object from the remote.
async fn cmd_pull(config: ClientConfig, object: &str, dest: &Path) -> Result<()> {
    let client = connect(config)?;
    client
        .pull(object, dest)
        .await
        .with_context(|| format!("Failed to pull '{}'", object))?;

    println!("Pulled {} <- {}", dest.display(), object);
    Ok(())
}

async fn cmd_add_key(config: ClientConfig, public_key: &Path, name: &str) -> Result<()> {
    let client = connect(config)?;
    client
        .add_key(public_key, name)
        .await
        .with_context(|| format!("Failed to add key '{}'", name))?;

    println!("Key '{}' registered", name);
    Ok(())
}

async fn cmd_gen_key(private_key: &Path, public_key: &Path, bits: usize) -> Result<()> {
    info!("Generating {}-bit key pair, this may take a while", bits);
    gen_key(private_key, public_key, bits)
        .await
        .context("Failed to generate key pair")?;

    println!("Private key: {}", private_key.display());
    println!("Public key:  {}", public_key.display());
    Ok(())
}
