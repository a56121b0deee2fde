//! peer-id: generate a Dilithium2 peer identity and print it as JSON.
//!
//! Usage:
//!   peer-id                      # print to stdout
//!   peer-id --out identity.json  # write to a file, print the peer id

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use braid_crypto::PeerKeyPair;

#[derive(Parser, Debug)]
#[command(name = "peer-id", version, about = "Generate a Braid peer identity")]
struct Args {
    /// Write the identity to this file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let identity = PeerKeyPair::generate();
    let json = serde_json::to_string_pretty(&identity.to_file())?;

    match args.out {
        Some(path) => {
            if path.exists() {
                anyhow::bail!("{} already exists, refusing to overwrite", path.display());
            }
            std::fs::write(&path, json)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}", identity.peer_id);
        }
        None => println!("{json}"),
    }
    Ok(())
}
