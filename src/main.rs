use std::error::Error;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenv_flow::dotenv_flow;
use mdip_resolver::{Anchor, Chain, Resolver, ResolverConfig, TxRef};
use tracing::debug;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Resolve DID:MDIP identifiers and work with TxRefs")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a DID to its current document pointer
    Resolve {
        did: String,
        /// Stop after fetching this many blocks while following updates
        #[clap(long)]
        max_blocks: Option<u64>,
        /// Give up after this many seconds
        #[clap(long)]
        timeout_secs: Option<u64>,
    },
    /// Encode a block position as a TxRef
    Encode {
        #[clap(long, default_value = "testnet")]
        chain: Chain,
        #[clap(long)]
        height: u32,
        #[clap(long)]
        position: u32,
        #[clap(long)]
        utxo: Option<u32>,
    },
    /// Decode a TxRef
    Decode { txref: String },
    /// Mint the DID of a confirmed transaction
    Did {
        txid: String,
        /// Anchor on the Omni node instead of Bitcoin
        #[clap(long)]
        omni: bool,
        #[clap(long)]
        utxo: Option<u32>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv_flow().ok();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let args = Args::parse();
    debug!(?args, "starting");

    match args.command {
        Command::Resolve {
            did,
            max_blocks,
            timeout_secs,
        } => {
            let config = ResolverConfig::from_env()?;
            let mut options = config.resolution_options();
            if max_blocks.is_some() {
                options.max_blocks = max_blocks;
            }
            if let Some(secs) = timeout_secs {
                options.timeout = Some(Duration::from_secs(secs));
            }

            let result = Resolver::from_config(&config).resolve(&did, &options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Encode {
            chain,
            height,
            position,
            utxo,
        } => {
            println!("{}", TxRef::new(chain, height, position, utxo)?);
        }
        Command::Decode { txref } => {
            let txref: TxRef = txref.parse()?;
            println!("{}", serde_json::to_string_pretty(&txref)?);
        }
        Command::Did { txid, omni, utxo } => {
            let config = ResolverConfig::from_env()?;
            let anchor = if omni { Anchor::Omni } else { Anchor::Btc };
            let did = Resolver::from_config(&config)
                .txid_to_did(anchor, &txid, utxo)
                .await?;
            println!("{did}");
        }
    }

    Ok(())
}
