//! P2P networking
//!
//! The live peer set and everything that moves messages through it:
//! framed protocol messages, per-peer connection handling with a bounded
//! send queue, and the registry that accepts, dials, broadcasts and reaps.

pub mod message;
pub mod peer;
pub mod registry;

pub use message::{FrameCodec, Message, MessageType, PROTOCOL_VERSION};
pub use peer::{Peer, PeerError, PeerState, LIVENESS_TIMEOUT, SEND_QUEUE_DEPTH};
pub use registry::{NodeConfig, NodeService, PeerRegistry, REAP_INTERVAL};
