//! Embernet: the peer-to-peer networking core of a blockchain node
//!
//! This crate provides:
//! - A self-describing, length-prefixed recursive wire format with a
//!   schema-less decoded-value abstraction ([`wire`])
//! - Framed protocol messages and per-peer connection handling with a
//!   bounded, non-blocking send queue ([`network`])
//! - A peer registry that accepts inbound connections, dials outbound
//!   ones, broadcasts to the live peer set and reaps dead peers
//! - The canonical transaction encoding, content addressing and the
//!   big-integer fee schedule ([`core`])
//!
//! # Example
//!
//! ```no_run
//! use embernet::network::{NodeConfig, PeerRegistry};
//! use embernet::storage::MemDatabase;
//! use std::sync::Arc;
//!
//! # async fn run() -> std::io::Result<()> {
//! let config = NodeConfig {
//!     listen_addr: "0.0.0.0:30303".to_string(),
//!     bootstrap_peers: vec!["seed.example.net:30303".to_string()],
//!     client_fallback: false,
//! };
//! let registry = PeerRegistry::new(config, Arc::new(MemDatabase::new()), Vec::new());
//! registry.start().await?;
//! registry.wait_for_shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod network;
pub mod storage;
pub mod wire;

pub use crate::core::{compute_fee_schedule, FeeSchedule, Transaction, TransactionError, ADDRESS_LEN};
pub use crate::network::{
    Message, MessageType, NodeConfig, NodeService, Peer, PeerError, PeerRegistry, PeerState,
};
pub use crate::storage::{Database, MemDatabase};
pub use crate::wire::{WireError, WireValue};
