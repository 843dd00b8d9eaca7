//! # Encounter Observer Library
//!
//! Client side of the wave-survival encounter. An observer never decides
//! gameplay outcomes. It sends the player's actions to the server, mirrors
//! the replicated snapshots it receives, and plays cosmetic effects when
//! replicated values change.
//!
//! ## Replication Model
//!
//! Each server tick the observer receives one snapshot carrying current
//! values only: health, wave state, power levels, self-destruct flags and
//! every other player's latest weapon hit. Everything perceptible is derived
//! locally by diffing against the previous snapshot:
//!
//! - health deltas are computed as new minus old and are cosmetic only
//! - wave state, power level and flag changes fire on the edge
//! - a weapon hit is replayed once per distinct replicated value, so a
//!   snapshot seen twice never spawns an effect twice
//! - snapshots older than the last accepted tick are dropped
//!
//! The observer's own shots are excluded from its snapshots. It shows them
//! immediately when the fire request is sent.
//!
//! ## Module Organization
//!
//! ### Replica Module (`replica`)
//! The mirrored world and the snapshot diffing that produces cosmetic events.
//!
//! ### Effects Module (`effects`)
//! The cosmetic event vocabulary and the [`effects::EffectPlayer`] seam, with
//! a logging implementation for headless runs.
//!
//! ### Network Module (`network`)
//! UDP connection to the server, action sequencing, optional artificial
//! latency and an auto-fire mode for soak testing.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", 0, true).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod effects;
pub mod network;
pub mod replica;
