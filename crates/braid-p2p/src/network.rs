use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use braid_core::{BraidError, PeerId};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use crate::context::NodeContext;
use crate::message::Message;
use crate::status::SyncStatus;
use crate::sync::{RelayReceiver, SyncManager};

type Transport = Framed<TcpStream, LengthDelimitedCodec>;

struct Shared {
    ctx: NodeContext,
    /// Verified peers with a live connection.
    status: SyncStatus,
}

/// Owns the TCP listener. Pass to `tokio::spawn(manager.run())`.
///
/// Every inbound or outbound connection runs one [`SyncManager`] in its own
/// task over a length-delimited framed stream.
pub struct ConnectionManager {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Bind the configured listen address.
    pub async fn bind(ctx: NodeContext) -> Result<Self, BraidError> {
        let listener = TcpListener::bind(&ctx.config.listen_addr)
            .await
            .map_err(|e| BraidError::Io(format!("bind {}: {e}", ctx.config.listen_addr)))?;
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                ctx,
                status: SyncStatus::new(),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BraidError> {
        self.listener
            .local_addr()
            .map_err(|e| BraidError::Io(e.to_string()))
    }

    /// Number of peers with a completed handshake.
    pub fn peer_count(&self) -> usize {
        self.shared.status.peer_count()
    }

    /// Live per-peer sync states. The handle stays valid after `run` takes
    /// the manager.
    pub fn sync_status(&self) -> SyncStatus {
        self.shared.status.clone()
    }

    /// Dial `addr` in a background task.
    pub fn dial(&self, addr: String) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    let remote = stream.peer_addr().ok();
                    debug!(addr = %addr, "dialled peer");
                    run_connection(shared, stream, remote).await;
                }
                Err(e) => warn!(addr = %addr, error = %e, "dial failed"),
            }
        });
    }

    /// Dial the bootstrap peers, then accept connections forever.
    pub async fn run(self) {
        for addr in self.shared.ctx.config.bootstrap_peers.clone() {
            self.dial(addr);
        }
        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "P2P listening on"),
            Err(e) => warn!(error = %e, "listener has no local address"),
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, remote)) => {
                    debug!(remote = %remote, "inbound connection");
                    tokio::spawn(run_connection(self.shared.clone(), stream, Some(remote)));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }
}

async fn run_connection(shared: Arc<Shared>, stream: TcpStream, remote: Option<SocketAddr>) {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(shared.ctx.config.max_frame_size)
        .new_codec();
    let mut transport = Framed::new(stream, codec);
    let (mut manager, mut relay) = SyncManager::new(shared.ctx.clone());
    let mut registered = None;

    let result = drive(&shared, &mut transport, &mut manager, &mut relay, &mut registered).await;
    match result {
        Ok(()) => debug!(remote = ?remote, "connection closed"),
        Err(e) => warn!(remote = ?remote, error = %e, "connection failed"),
    }
    if let Some(peer) = registered {
        shared.status.remove(&peer);
    }
    manager.close();
}

async fn drive(
    shared: &Shared,
    transport: &mut Transport,
    manager: &mut SyncManager,
    relay: &mut RelayReceiver,
    registered: &mut Option<PeerId>,
) -> Result<(), BraidError> {
    let mut ticker = tokio::time::interval(shared.ctx.config.tick_interval);
    send_all(transport, manager.start(Instant::now())).await?;

    loop {
        let out = tokio::select! {
            frame = transport.next() => match frame {
                Some(Ok(bytes)) => manager.handle_bytes(&bytes, Instant::now())?,
                Some(Err(e)) => return Err(BraidError::Io(e.to_string())),
                None => return Ok(()),
            },
            Some(vertex) = relay.recv() => manager.on_relay(vertex),
            _ = ticker.tick() => manager.tick(Instant::now())?,
        };
        send_all(transport, out).await?;

        match *registered {
            Some(peer) => shared.status.update(peer, manager.state()),
            None => {
                if let Some(peer) = manager.peer_id() {
                    if !shared.status.register(peer, manager.state()) {
                        info!(peer = %peer, "already connected to peer, closing duplicate");
                        return Ok(());
                    }
                    *registered = Some(peer);
                }
            }
        }
    }
}

async fn send_all(transport: &mut Transport, messages: Vec<Message>) -> Result<(), BraidError> {
    for msg in messages {
        let bytes = msg.to_bytes()?;
        transport
            .send(Bytes::from(bytes))
            .await
            .map_err(|e| BraidError::Io(e.to_string()))?;
    }
    Ok(())
}
