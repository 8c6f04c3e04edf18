//! One peer connection
//!
//! A [`Peer`] wraps a single TCP connection: a bounded outgoing message
//! queue drained by a writer task, a reader task decoding frames and
//! handing them to the registry, a liveness timestamp refreshed on every
//! received message, and an atomic disconnect flag that both the peer's
//! own tasks and the registry's reaper consult.

use crate::network::message::{FrameCodec, Message, MessageType, PROTOCOL_VERSION};
use crate::network::registry::PeerRegistry;
use crate::wire::WireValue;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

/// Maximum silence tolerated from an inbound peer before it is
/// considered dead. Outbound peers are exempt: the local dial policy
/// maintains those.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Outgoing queue depth. The queue is the backpressure boundary: a peer
/// whose drain has stalled long enough to fill it gets disconnected
/// instead of blocking the sender.
pub const SEND_QUEUE_DEPTH: usize = 512;

/// Peer-level failures; each costs at most this one peer.
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("peer is disconnecting")]
    Disconnected,
    #[error("outgoing queue full")]
    QueueFull,
}

/// Connection lifecycle. Transitions run strictly forward:
/// `Connecting → Active → Disconnecting → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerState {
    Connecting = 0,
    Active = 1,
    Disconnecting = 2,
    Closed = 3,
}

impl PeerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PeerState::Connecting,
            1 => PeerState::Active,
            2 => PeerState::Disconnecting,
            _ => PeerState::Closed,
        }
    }
}

/// A single network peer, inbound or outbound.
pub struct Peer {
    addr: String,
    inbound: bool,
    /// Non-owning back-reference for registry-level dispatch only.
    registry: Weak<PeerRegistry>,
    state: AtomicU8,
    disconnect: AtomicBool,
    /// Guards the teardown in `stop`, independently of `disconnect`:
    /// the flag alone can be raised by a full queue or a failed write,
    /// and such a peer still needs its tasks torn down when reaped.
    stopped: AtomicBool,
    started: Instant,
    /// Seconds since `started` at the last received message.
    last_liveness: AtomicU64,
    outbox: mpsc::Sender<Message>,
    /// Taken by the writer task on start.
    outbox_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    /// Present for accepted connections; outbound peers dial on start.
    stream: Mutex<Option<TcpStream>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Peer {
    fn new(
        addr: String,
        stream: Option<TcpStream>,
        registry: Weak<PeerRegistry>,
        inbound: bool,
    ) -> Self {
        let (outbox, outbox_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        Self {
            addr,
            inbound,
            registry,
            state: AtomicU8::new(PeerState::Connecting as u8),
            disconnect: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            started: Instant::now(),
            last_liveness: AtomicU64::new(0),
            outbox,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            stream: Mutex::new(stream),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Wrap an accepted connection.
    pub fn inbound(stream: TcpStream, registry: Weak<PeerRegistry>) -> Self {
        let addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::new(addr, Some(stream), registry, true)
    }

    /// Create an outbound peer; the dial happens in [`Peer::start`].
    pub fn outbound(addr: String, registry: Weak<PeerRegistry>) -> Self {
        Self::new(addr, None, registry, false)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_inbound(&self) -> bool {
        self.inbound
    }

    pub fn state(&self) -> PeerState {
        PeerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PeerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Whether the disconnect flag has been raised.
    pub fn is_disconnecting(&self) -> bool {
        self.disconnect.load(Ordering::SeqCst)
    }

    /// Record activity from the remote end.
    pub fn mark_alive(&self) {
        self.last_liveness
            .store(self.started.elapsed().as_secs(), Ordering::SeqCst);
    }

    /// Time since the last received message.
    pub fn silent_for(&self) -> Duration {
        let elapsed = self.started.elapsed().as_secs();
        Duration::from_secs(elapsed.saturating_sub(self.last_liveness.load(Ordering::SeqCst)))
    }

    /// The reaper's predicate: disconnected, or inbound and silent past
    /// the liveness timeout. Outbound peers never time out here.
    pub fn is_dead(&self) -> bool {
        self.dead_with_silence(self.silent_for())
    }

    fn dead_with_silence(&self, silence: Duration) -> bool {
        self.disconnect.load(Ordering::SeqCst) || (self.inbound && silence > LIVENESS_TIMEOUT)
    }

    /// Enqueue a framed message for delivery. Never blocks on network
    /// I/O; a full queue raises the disconnect flag so the reaper will
    /// remove this peer.
    pub fn queue_message(&self, kind: MessageType, payload: WireValue) -> Result<(), PeerError> {
        if self.is_disconnecting() {
            return Err(PeerError::Disconnected);
        }
        match self.outbox.try_send(Message::new(kind, payload)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("outgoing queue full for {}, disconnecting", self.addr);
                self.disconnect.store(true, Ordering::SeqCst);
                Err(PeerError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PeerError::Disconnected),
        }
    }

    /// Begin the connection's read and write activities. Outbound peers
    /// dial here; a failed dial is observable through the disconnect
    /// flag rather than a return value.
    pub fn start(self: &Arc<Self>) {
        let peer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let stream = match peer.take_stream() {
                Some(stream) => stream,
                None => match TcpStream::connect(&peer.addr).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::warn!("dial {} failed: {}", peer.addr, e);
                        peer.disconnect.store(true, Ordering::SeqCst);
                        peer.set_state(PeerState::Closed);
                        return;
                    }
                },
            };
            peer.set_state(PeerState::Active);
            peer.run(stream).await;
        });
        self.register_task(handle);
    }

    /// Track a task so `stop` can abort it. When `stop` has already run
    /// nothing would ever abort this handle, so it is aborted here.
    fn register_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if !self.stopped.load(Ordering::SeqCst) {
                tasks.push(handle);
                return;
            }
        }
        handle.abort();
    }

    fn take_stream(&self) -> Option<TcpStream> {
        self.stream.lock().ok().and_then(|mut slot| slot.take())
    }

    async fn run(self: Arc<Self>, stream: TcpStream) {
        let framed = Framed::new(stream, FrameCodec);
        let (mut sink, mut reader) = framed.split();

        let mut rx = match self.outbox_rx.lock().ok().and_then(|mut slot| slot.take()) {
            Some(rx) => rx,
            None => return, // started twice
        };

        // Introduce ourselves before anything else.
        if let Some(registry) = self.registry.upgrade() {
            let hello = WireValue::list(vec![
                WireValue::uint(PROTOCOL_VERSION),
                WireValue::uint(registry.nonce()),
            ]);
            let _ = self.queue_message(MessageType::Handshake, hello);
        }

        let writer_peer = Arc::clone(&self);
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    log::warn!("write to {} failed: {}", writer_peer.addr, e);
                    writer_peer.disconnect.store(true, Ordering::SeqCst);
                    break;
                }
            }
        });
        let writer_abort = writer.abort_handle();
        self.register_task(writer);

        loop {
            match reader.next().await {
                Some(Ok(msg)) => {
                    self.mark_alive();
                    if let Some(registry) = self.registry.upgrade() {
                        registry.dispatch(&self, msg).await;
                    }
                }
                Some(Err(e)) => {
                    log::warn!("read from {} failed: {}", self.addr, e);
                    break;
                }
                None => {
                    log::info!("peer {} closed the connection", self.addr);
                    break;
                }
            }
            if self.is_disconnecting() {
                break;
            }
        }

        writer_abort.abort();
        self.disconnect.store(true, Ordering::SeqCst);
        self.set_state(PeerState::Closed);
    }

    /// Raise the disconnect flag, abort both I/O activities (closing the
    /// local socket, which unblocks any pending read or write) and mark
    /// the peer closed. Idempotent: stopping twice is a no-op. A peer
    /// whose disconnect flag was raised elsewhere (full queue, failed
    /// write) is still torn down by the first `stop`.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disconnect.store(true, Ordering::SeqCst);
        self.set_state(PeerState::Disconnecting);
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.set_state(PeerState::Closed);
    }

    /// Take the outgoing queue's receiving end. Only meaningful before
    /// `start`, which otherwise hands it to the writer task.
    #[cfg(test)]
    pub(crate) fn take_outbox(&self) -> Option<mpsc::Receiver<Message>> {
        self.outbox_rx.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_outbound(addr: &str) -> Peer {
        Peer::outbound(addr.to_string(), Weak::new())
    }

    #[tokio::test]
    async fn fresh_peer_is_connecting_and_alive() {
        let peer = detached_outbound("127.0.0.1:1");
        assert_eq!(peer.state(), PeerState::Connecting);
        assert!(!peer.is_dead());
    }

    #[tokio::test]
    async fn disconnect_flag_marks_peer_dead() {
        let peer = detached_outbound("127.0.0.1:1");
        peer.stop();
        assert!(peer.is_dead());
        assert_eq!(peer.state(), PeerState::Closed);
    }

    #[tokio::test]
    async fn liveness_timeout_applies_only_to_inbound() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let inbound = Peer::inbound(stream, Weak::new());
        let outbound = detached_outbound("127.0.0.1:1");
        let stale = LIVENESS_TIMEOUT + Duration::from_secs(1);

        // Same silence: the inbound peer is dead, the outbound one is not.
        assert!(inbound.dead_with_silence(stale));
        assert!(!outbound.dead_with_silence(stale));

        // Just under the limit nobody is dead.
        let fresh = LIVENESS_TIMEOUT - Duration::from_secs(1);
        assert!(!inbound.dead_with_silence(fresh));
    }

    #[tokio::test]
    async fn queued_messages_keep_fifo_order() {
        let peer = detached_outbound("127.0.0.1:1");
        peer.queue_message(MessageType::Ping, WireValue::uint(1))
            .unwrap();
        peer.queue_message(MessageType::Ping, WireValue::uint(2))
            .unwrap();

        let mut rx = peer.take_outbox().unwrap();
        assert_eq!(rx.try_recv().unwrap().payload.as_u64(), 1);
        assert_eq!(rx.try_recv().unwrap().payload.as_u64(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_disconnects_instead_of_blocking() {
        let peer = detached_outbound("127.0.0.1:1");
        for _ in 0..SEND_QUEUE_DEPTH {
            peer.queue_message(MessageType::Ping, WireValue::uint(0))
                .unwrap();
        }
        let err = peer
            .queue_message(MessageType::Ping, WireValue::uint(0))
            .unwrap_err();
        assert!(matches!(err, PeerError::QueueFull));
        assert!(peer.is_dead());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let peer = detached_outbound("127.0.0.1:1");
        peer.stop();
        peer.stop();
        assert_eq!(peer.state(), PeerState::Closed);
    }

    #[tokio::test]
    async fn stop_tears_down_after_queue_full_disconnect() {
        // A full queue raises the disconnect flag on its own; the later
        // stop (the reaper's) must still abort tasks and close the peer.
        let peer = detached_outbound("127.0.0.1:1");
        for _ in 0..SEND_QUEUE_DEPTH {
            peer.queue_message(MessageType::Ping, WireValue::uint(0))
                .unwrap();
        }
        let _ = peer.queue_message(MessageType::Ping, WireValue::uint(0));
        assert!(peer.is_disconnecting());
        assert_eq!(peer.state(), PeerState::Connecting);

        peer.stop();
        assert_eq!(peer.state(), PeerState::Closed);
    }

    #[tokio::test]
    async fn stop_closes_the_connection() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let peer = Arc::new(Peer::inbound(stream, Weak::new()));
        peer.start();
        // Let the reader park on the socket before tearing it down.
        tokio::time::sleep(Duration::from_millis(50)).await;

        peer.stop();

        // Aborting the I/O tasks drops the stream; the remote sees EOF.
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("remote end never saw the connection close");
        assert_eq!(read.unwrap(), 0);
    }

    #[tokio::test]
    async fn start_after_stop_spawns_no_activity() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = Arc::new(detached_outbound(&addr.to_string()));
        peer.stop();
        peer.start();

        // The already-stopped peer must not dial anybody.
        let accepted =
            tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(accepted.is_err());
        assert_eq!(peer.state(), PeerState::Closed);
    }

    #[tokio::test]
    async fn failed_dial_raises_disconnect_flag() {
        // A port nothing listens on; connect must fail quickly on loopback.
        let peer = Arc::new(detached_outbound("127.0.0.1:1"));
        peer.start();

        for _ in 0..100 {
            if peer.is_disconnecting() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(peer.is_disconnecting());
        assert!(peer.is_dead());
    }
}
