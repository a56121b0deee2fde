//! braid-node: the Braid full-node binary.
//!
//! Startup sequence:
//!   1. Load or create the peer identity
//!   2. Open the vertex store and write genesis if it is fresh
//!   3. Listen for peers and dial the bootstrap list
//!   4. Log per-peer sync status every minute
//!   5. Run until Ctrl-C, then flush the store

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use braid_consensus::PowVerifier;
use braid_crypto::{PeerIdentityFile, PeerKeyPair};
use braid_genesis::NetworkParams;
use braid_p2p::{ConnectionManager, NodeContext, SyncConfig};
use braid_state::{PubSub, SledStore, ValidationEngine};

const IDENTITY_FILE: &str = "identity.json";
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(
    name = "braid-node",
    version,
    about = "Braid full node: a block/transaction DAG ledger"
)]
struct Args {
    /// Directory for the vertex store and peer identity.
    #[arg(long, default_value = "~/.braid/data")]
    data_dir: PathBuf,

    /// TCP listen address for peer connections.
    #[arg(long, default_value = "0.0.0.0:7777")]
    listen: String,

    /// Bootstrap peers as host:port (comma-separated).
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Network parameters JSON. Defaults to the built-in testnet.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Peer identity JSON (as written by `peer-id`). Defaults to
    /// `<data-dir>/identity.json`, created on first run.
    #[arg(long)]
    identity: Option<PathBuf>,

    /// Log filter, overriding RUST_LOG.
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => tracing_subscriber::EnvFilter::try_new(directives)
            .with_context(|| format!("parsing log filter {directives:?}"))?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,braid=debug")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Braid node starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    // ── Identity ──────────────────────────────────────────────────────────────
    let identity_path = args
        .identity
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(|| data_dir.join(IDENTITY_FILE));
    let identity = load_or_create_identity(&identity_path)?;
    info!(peer_id = %identity.peer_id, "peer identity");

    // ── Network parameters ────────────────────────────────────────────────────
    let params = match &args.params {
        Some(path) => NetworkParams::load(&expand_tilde(path))
            .with_context(|| format!("loading network params from {}", path.display()))?,
        None => {
            info!("no --params given, using built-in testnet parameters");
            NetworkParams::testnet()
        }
    };

    // ── Vertex store ──────────────────────────────────────────────────────────
    let store = SledStore::open(data_dir.join("db")).context("opening vertex store")?;
    let engine = ValidationEngine::open(
        Box::new(store),
        params,
        Arc::new(PowVerifier),
        Arc::new(PubSub::new()),
    )
    .context("opening validation engine")?;
    match engine.best_block() {
        Some((best, weight)) => info!(
            network = %engine.params().network,
            genesis = %engine.genesis(),
            best_block = %best,
            accumulated_weight = weight,
            "ledger ready"
        ),
        None => info!(network = %engine.params().network, "ledger ready"),
    }

    // ── Peers ─────────────────────────────────────────────────────────────────
    let config = SyncConfig {
        listen_addr: args.listen.clone(),
        bootstrap_peers: args.peers.clone(),
        ..SyncConfig::default()
    };
    let ctx = NodeContext::new(engine, identity, config);
    let manager = ConnectionManager::bind(ctx.clone())
        .await
        .context("starting peer listener")?;

    let status = manager.sync_status();
    tokio::spawn(async move {
        let mut every = tokio::time::interval(STATUS_LOG_INTERVAL);
        loop {
            every.tick().await;
            info!(
                peers = status.peer_count(),
                synced_peers = status.synced_peers(),
                synced = status.is_synced(),
                "sync status"
            );
        }
    });

    info!("node ready");
    tokio::select! {
        _ = manager.run() => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "waiting for Ctrl-C failed");
            }
            info!("shutting down");
        }
    }

    ctx.engine.lock().flush().context("flushing vertex store")?;
    Ok(())
}

/// Read the identity at `path`, or generate one and write it there.
fn load_or_create_identity(path: &Path) -> anyhow::Result<PeerKeyPair> {
    if path.exists() {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading peer identity from {}", path.display()))?;
        let file: PeerIdentityFile =
            serde_json::from_str(&json).context("parsing peer identity JSON")?;
        return PeerKeyPair::from_file(&file)
            .with_context(|| format!("invalid peer identity in {}", path.display()));
    }

    let identity = PeerKeyPair::generate();
    let json = serde_json::to_string_pretty(&identity.to_file())?;
    std::fs::write(path, json)
        .with_context(|| format!("writing peer identity to {}", path.display()))?;
    info!(path = %path.display(), "generated new peer identity");
    Ok(identity)
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
