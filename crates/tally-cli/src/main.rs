//! TALLY CLI
//!
//! Key generation, a demonstration exchange between a matching system and a
//! DSP, and batch opening of label messages.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, DirectoryEntry};
use tally_core::{
    Campaign, KeyStore, LabelKeyCache, LabelMessage, Receiver, Sender, SharedIdentity, TallyConfig,
    TransactionId,
};
use tally_discovery::{StaticDirectory, TrustCache, record_name};

/// TALLY - authenticated, transaction-bound label encryption
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: user config dir, tally/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an identity key ring and its directory records
    Keygen {
        /// Number of key pairs in the ring (1-5)
        #[arg(long, default_value_t = 5)]
        ring: usize,

        /// Authority name the keys are published under
        #[arg(short, long, default_value = "example.com")]
        authority: String,

        /// Write the identity and its records to this config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a complete exchange with freshly generated identities
    Demo {
        /// Match transaction id
        #[arg(long, default_value = "2VwhmTY9MecgWsu6")]
        txid: String,

        /// Matching system authority
        #[arg(long, default_value = "match-system-operator.com")]
        sender: String,

        /// DSP authority
        #[arg(long, default_value = "dsp.example")]
        receiver: String,
    },

    /// Activate a campaign and open a label message
    Open {
        /// Campaign JSON file
        #[arg(long)]
        campaign: PathBuf,

        /// Label message JSON file
        #[arg(long)]
        message: PathBuf,

        /// Local private key as hex (repeat for older ring keys)
        #[arg(long = "private-key")]
        private_keys: Vec<String>,

        /// Local authority name (overrides the config file)
        #[arg(short, long)]
        authority: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref())?;
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(level.as_str())
        .with_writer(std::io::stderr)
        .init();

    let settings = config.tally_config();

    match cli.command {
        Commands::Keygen {
            ring,
            authority,
            output,
        } => {
            generate_keys(ring, &authority, output.as_deref(), &settings)?;
        }
        Commands::Demo {
            txid,
            sender,
            receiver,
        } => {
            run_demo(&txid, &sender, &receiver, &settings).await?;
        }
        Commands::Open {
            campaign,
            message,
            private_keys,
            authority,
        } => {
            let identity_name = authority.as_deref();
            open_labels(
                &campaign,
                &message,
                &config,
                identity_name,
                &private_keys,
                &settings,
            )
            .await?;
        }
    }

    Ok(())
}

/// Generate a key ring and print (or save) it with its directory records
fn generate_keys(
    ring: usize,
    authority: &str,
    output: Option<&Path>,
    settings: &TallyConfig,
) -> anyhow::Result<()> {
    let store = KeyStore::new(settings.rotation.clone());
    let identity = store.initialize_with(authority, ring)?;

    for (i, pair) in identity.key_ring().iter().enumerate() {
        println!("Key {i}:");
        if output.is_none() {
            println!("  Private Key: {}", pair.export_private_hex().as_str());
        }
        println!("  Public Key: {}", hex::encode(pair.public_key().as_bytes()));
        println!("  Public Key Base64url: {}", pair.public_key().to_base64url());
    }

    println!();
    println!("Directory records for {}:", record_name(authority));
    let records = identity.directory_records();
    for record in &records {
        println!("  \"{record}\"");
    }

    if let Some(path) = output {
        let mut config = Config::default();
        config.identity.name = authority.to_string();
        config.identity.private_keys = identity
            .key_ring()
            .iter()
            .map(|pair| pair.export_private_hex().as_str().to_owned())
            .collect();
        config.directory.push(DirectoryEntry {
            authority: authority.to_string(),
            records,
        });
        config.save(path)?;

        println!();
        println!("Identity saved to: {}", path.display());
        println!("Keep this file secure! It contains your private keys.");
    }

    Ok(())
}

/// Matching system seals a zero and a one label; the DSP opens them
async fn run_demo(
    txid: &str,
    sender_name: &str,
    receiver_name: &str,
    settings: &TallyConfig,
) -> anyhow::Result<()> {
    let transaction_id = TransactionId::new(txid)?;
    let store = KeyStore::new(settings.rotation.clone());

    let ms = store.initialize_with(sender_name, 1)?;
    let ms_pair = ms.current();
    println!(
        "Matching System Private Key: {}",
        ms_pair.export_private_hex().as_str()
    );
    println!(
        "Matching System Public Key: {}",
        hex::encode(ms_pair.public_key().as_bytes())
    );
    println!(
        "Matching System Public Key Base64url: {}",
        ms_pair.public_key().to_base64url()
    );

    let dsp = store.initialize_with(receiver_name, 1)?;
    let dsp_pair = dsp.current();
    let dsp_public = *dsp_pair.public_key();
    println!("DSP Private Key: {}", dsp_pair.export_private_hex().as_str());
    println!("DSP Public Key: {}", hex::encode(dsp_public.as_bytes()));
    println!("DSP Public Key Base64url: {}", dsp_public.to_base64url());

    let directory = StaticDirectory::new();
    directory.publish(ms.name(), ms.directory_records()).await;
    directory.publish(dsp.name(), dsp.directory_records()).await;
    let trust = TrustCache::new(directory, settings.discovery.clone());

    let sender = Sender::new(SharedIdentity::new(ms));
    let receiver = Receiver::new(
        SharedIdentity::new(dsp),
        Arc::new(LabelKeyCache::new(&settings.cache)),
    );

    let campaign = sender
        .establish_discovered(receiver_name, &dsp_public, &trust, transaction_id.clone())
        .await?;
    println!(
        "Encapsulated Key: {}",
        hex::encode(campaign.encapsulated_key.as_bytes())
    );
    println!("Match Transaction Id: {transaction_id}");

    let message = sender.seal_batch([(txid, false), (txid, true)])?;
    for (i, entry) in message.labels.iter().enumerate() {
        println!("Encrypted Label{i} Base64: {}", entry.label);
    }

    receiver.activate_discovered(&campaign, &trust).await?;
    for (i, entry) in message.labels.iter().enumerate() {
        let label = receiver.open(&message.authority, &entry.transaction_id, &entry.label)?;
        println!("Decrypted Label{i}: {}", if label { "ff" } else { "00" });
    }

    Ok(())
}

/// Activate a campaign from file and print the labels that open
async fn open_labels(
    campaign_path: &Path,
    message_path: &Path,
    config: &Config,
    identity_name: Option<&str>,
    private_keys: &[String],
    settings: &TallyConfig,
) -> anyhow::Result<()> {
    let identity = config.identity(identity_name, private_keys)?;

    let campaign = std::fs::read_to_string(campaign_path)
        .with_context(|| format!("reading {}", campaign_path.display()))?;
    let campaign = Campaign::from_json(&campaign)?;

    let message = std::fs::read_to_string(message_path)
        .with_context(|| format!("reading {}", message_path.display()))?;
    let message = LabelMessage::from_json(&message)?;

    if message.authority != campaign.authority {
        tracing::warn!(
            campaign = %campaign.authority,
            message = %message.authority,
            "Message sender does not match the campaign authority"
        );
    }

    let trust = TrustCache::new(config.directory().await, settings.discovery.clone());
    let receiver = Receiver::new(
        SharedIdentity::new(identity),
        Arc::new(LabelKeyCache::new(&settings.cache)),
    );
    receiver
        .activate_discovered(&campaign, &trust)
        .await
        .context("campaign is invalid")?;

    let (opened, dropped) = receiver.open_batch_counted(&message);
    tracing::info!(
        opened = opened.len(),
        dropped,
        "Opened label message"
    );
    println!("{}", serde_json::to_string_pretty(&opened)?);

    Ok(())
}
