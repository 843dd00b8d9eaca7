//! # Encounter Server Library
//!
//! Authoritative simulation for a cooperative wave-survival encounter. The
//! server owns every gameplay decision: health, damage, waves, bot behaviour
//! and weapon hits. Observers receive replicated snapshots and only play
//! cosmetic effects.
//!
//! ## Core Responsibilities
//!
//! ### Health and Damage
//! The [`health`] ledger is the only place health changes. It suppresses
//! friendly fire, clamps to `[0, max]`, and reports each death exactly once.
//!
//! ### Encounter Pacing
//! The [`director`] runs the wave cycle: wait, spawn `bots_per_wave * wave`
//! threat units one per interval, wait for the field to clear, repeat. A
//! periodic liveness poll ends the encounter when every player is down.
//!
//! ### Threat Units
//! A [`tracker`] chases the nearest hostile, primes on contact, damages itself
//! to zero, then detonates once. The explosion scales with its power level,
//! which the [`swarm`] aggregator derives from nearby peers.
//!
//! ### Combat
//! A [`combat`] weapon traces from its owner's eye, enforces the rate of fire
//! across single shots and automatic fire, multiplies damage on vulnerable
//! surfaces and replicates the latest hit to everyone but the shooter. In
//! projectile mode it launches a [`projectile`] instead, which explodes on
//! impact or when its fuse runs out.
//!
//! ## Architecture Design
//!
//! ### Single Timeline
//! Everything runs on one logical thread. The [`scheduler`] fires timers in
//! (time, insertion) order, and [`game::Simulation`] routes notifications
//! from the [`events`] bus back into the components after each mutation.
//! Reruns with the same seed and inputs produce the same results.
//!
//! ### Collaborator Seams
//! Spatial queries, pathfinding and spawn placement sit behind the traits in
//! [`collaborators`] so the simulation can be driven with simple geometry in
//! tests and swapped for a real engine later.
//!
//! ### UDP Transport
//! The [`network`] server accepts connections, queues player actions through
//! the [`client_manager`], steps the simulation at a fixed tick rate and sends
//! each client a snapshot tailored to its avatar.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Tuning;
//! use server::game::Simulation;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let simulation = Simulation::new(Tuning::default(), 42);
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(33),
//!         8,
//!         simulation,
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod barrel;
pub mod client_manager;
pub mod collaborators;
pub mod combat;
pub mod config;
pub mod director;
pub mod events;
pub mod game;
pub mod health;
pub mod network;
pub mod powerup;
pub mod projectile;
pub mod scheduler;
pub mod swarm;
pub mod tracker;
pub mod world;
