//! Peer registry
//!
//! The registry owns the live peer set: it accepts inbound connections,
//! dials outbound ones, broadcasts to everyone, and periodically reaps
//! peers whose disconnect flag is up or whose inbound connection has gone
//! silent. All access to the collection goes through one `RwLock`, so
//! concurrent accepts, broadcasts and reaping passes always see a
//! consistent set.

use crate::network::message::{Message, MessageType, PROTOCOL_VERSION};
use crate::network::peer::Peer;
use crate::storage::Database;
use crate::wire::WireValue;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time;

/// How often the reaper scans the peer set.
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Node configuration, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// `host:port` to listen on for inbound peers.
    pub listen_addr: String,
    /// Addresses dialed on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// When the listen address cannot be bound, keep running as an
    /// outbound-only client instead of failing. Off in production.
    #[serde(default)]
    pub client_fallback: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:30303".to_string(),
            bootstrap_peers: Vec::new(),
            client_fallback: false,
        }
    }
}

/// Lifecycle hooks for the collaborators the registry drives but does
/// not otherwise know about (transaction pool, block manager).
pub trait NodeService: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Owns all peers; the only place a peer's network resource is released.
pub struct PeerRegistry {
    config: NodeConfig,
    /// Node identity, carried in every handshake. A peer presenting our
    /// own nonce is a connection to ourselves.
    nonce: u64,
    peers: RwLock<Vec<Arc<Peer>>>,
    db: Arc<dyn Database>,
    services: Vec<Arc<dyn NodeService>>,
    shutdown_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerRegistry {
    pub fn new(
        config: NodeConfig,
        db: Arc<dyn Database>,
        services: Vec<Arc<dyn NodeService>>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            nonce: rand::random(),
            peers: RwLock::new(Vec::new()),
            db,
            services,
            shutdown_tx,
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Wrap an accepted connection as an inbound peer and start it.
    pub async fn add_peer(self: &Arc<Self>, stream: TcpStream) -> Arc<Peer> {
        let peer = Arc::new(Peer::inbound(stream, Arc::downgrade(self)));
        log::info!("peer connected :: {}", peer.addr());
        self.peers.write().await.push(Arc::clone(&peer));
        peer.start();
        peer
    }

    /// Register an outbound peer for `addr`; the dial happens inside the
    /// peer's start and its failure shows up on the disconnect flag.
    pub async fn connect_to_peer(self: &Arc<Self>, addr: &str) -> Arc<Peer> {
        let peer = Arc::new(Peer::outbound(addr.to_string(), Arc::downgrade(self)));
        self.peers.write().await.push(Arc::clone(&peer));
        peer.start();
        peer
    }

    /// Dial every address in the list; one bad address never aborts the
    /// rest.
    pub async fn process_peer_list(self: &Arc<Self>, addrs: &[String]) {
        for addr in addrs {
            if addr.is_empty() {
                continue;
            }
            self.connect_to_peer(addr).await;
        }
    }

    /// Snapshot of the outbound peers, in registry order.
    pub async fn outbound_peers(&self) -> Vec<Arc<Peer>> {
        let peers = self.peers.read().await;
        peers.iter().filter(|p| !p.is_inbound()).cloned().collect()
    }

    /// Snapshot of the inbound peers, in registry order.
    pub async fn inbound_peers(&self) -> Vec<Arc<Peer>> {
        let peers = self.peers.read().await;
        peers.iter().filter(|p| p.is_inbound()).cloned().collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Enqueue one message on every current peer's send queue. Failure
    /// to enqueue on one peer never blocks delivery to the others.
    pub async fn broadcast(&self, kind: MessageType, payload: WireValue) {
        let peers = self.peers.read().await;
        for peer in peers.iter() {
            if let Err(e) = peer.queue_message(kind, payload.clone()) {
                log::warn!("broadcast {} to {} failed: {}", kind.name(), peer.addr(), e);
            }
        }
    }

    /// One reaping pass: collect every dead peer while scanning, then
    /// stop them outside the pass.
    pub async fn reap_dead_peers(&self) {
        let mut condemned = Vec::new();
        {
            let mut peers = self.peers.write().await;
            peers.retain(|peer| {
                if peer.is_dead() {
                    condemned.push(Arc::clone(peer));
                    false
                } else {
                    true
                }
            });
        }
        for peer in condemned {
            log::info!("dead peer found, reaping :: {}", peer.addr());
            peer.stop();
        }
    }

    /// Bind the listen address, spawn the accept loop and the reaper,
    /// start the collaborating services and dial the bootstrap peers.
    ///
    /// A failed bind is fatal unless `client_fallback` is set, in which
    /// case the node keeps running against its bootstrap peers only.
    pub async fn start(self: &Arc<Self>) -> io::Result<()> {
        for service in &self.services {
            service.start();
        }

        match TcpListener::bind(&self.config.listen_addr).await {
            Ok(listener) => {
                log::info!("listening on {}", self.config.listen_addr);
                let registry = Arc::clone(self);
                self.push_task(tokio::spawn(async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, _)) => {
                                registry.add_peer(stream).await;
                            }
                            Err(e) => {
                                log::warn!("accept failed: {}", e);
                            }
                        }
                    }
                }));
            }
            Err(e) if self.config.client_fallback => {
                log::warn!(
                    "cannot listen on {} ({}); acting as client",
                    self.config.listen_addr,
                    e
                );
            }
            Err(e) => return Err(e),
        }

        let bootstrap = self.config.bootstrap_peers.clone();
        self.process_peer_list(&bootstrap).await;

        let registry = Arc::clone(self);
        self.push_task(tokio::spawn(async move {
            let mut ticker = time::interval(REAP_INTERVAL);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                registry.reap_dead_peers().await;
            }
        }));

        Ok(())
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }

    /// Shut the node down: stop the background loops, stop every peer
    /// (best-effort), close the database, fire the shutdown signal and
    /// stop the services in reverse start order. Idempotent; safe to
    /// race with a reaping pass since peer stop is itself idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        let peers: Vec<Arc<Peer>> = {
            let mut peers = self.peers.write().await;
            peers.drain(..).collect()
        };
        for peer in peers {
            peer.stop();
        }

        self.db.close();
        // send_replace stores the value even with no waiter subscribed
        // yet, so a late wait_for_shutdown still returns.
        self.shutdown_tx.send_replace(true);

        for service in self.services.iter().rev() {
            service.stop();
        }
    }

    /// Block until [`PeerRegistry::stop`] has signaled. Any number of
    /// waiters may park here; all are released by the single signal.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Registry-level handling for a decoded message from `peer`.
    pub async fn dispatch(self: &Arc<Self>, peer: &Arc<Peer>, msg: Message) {
        log::debug!("{} from {}", msg.kind.name(), peer.addr());

        match msg.kind {
            MessageType::Handshake => {
                let version = msg.payload.get(0).as_u64();
                let nonce = msg.payload.get(1).as_u64();
                if version != PROTOCOL_VERSION {
                    log::warn!(
                        "peer {} speaks protocol version {}, ours is {}",
                        peer.addr(),
                        version,
                        PROTOCOL_VERSION
                    );
                }
                if nonce == self.nonce {
                    log::info!("connected to ourselves, dropping {}", peer.addr());
                    peer.stop();
                }
            }
            MessageType::Disconnect => {
                peer.stop();
            }
            MessageType::Ping => {
                // Echo the probe payload back.
                let _ = peer.queue_message(MessageType::Pong, msg.payload);
            }
            MessageType::Pong => {
                // Liveness was already refreshed by the read loop.
            }
            MessageType::GetPeers => {
                let addrs: Vec<WireValue> = self
                    .outbound_peers()
                    .await
                    .iter()
                    .map(|p| WireValue::string(p.addr()))
                    .collect();
                let _ = peer.queue_message(MessageType::Peers, WireValue::list(addrs));
            }
            MessageType::Peers => {
                let addrs: Vec<String> = msg
                    .payload
                    .as_list()
                    .iter()
                    .map(|v| v.as_str())
                    .collect();
                self.process_peer_list(&addrs).await;
            }
            MessageType::Txs | MessageType::Blocks => {
                // Relay payloads belong to the transaction pool and block
                // manager collaborators, outside the networking core.
                log::debug!(
                    "{} payload with {} items from {}",
                    msg.kind.name(),
                    msg.payload.len(),
                    peer.addr()
                );
            }
        }
    }
}
