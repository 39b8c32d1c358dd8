//! # Boss Arena Server Library
//!
//! This library provides the authoritative server for the cooperative boss-fight
//! arena. It owns the one true copy of the world, turns client inputs into simulation
//! steps at a fixed tick rate, and streams the result back to every connected peer.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Players, projectiles and the boss exist only here. Clients send intent (a move
//! direction and fire/dash flags) and receive state; they never decide outcomes such as
//! hits, deaths or rewards.
//!
//! ### Session Management
//! Handles the complete lifecycle of a peer:
//! - Connection acceptance and player id assignment (ids are never reused)
//! - Per-session framing, malformed-input detection and silence timeouts
//! - Disconnection with a human-readable reason whenever the peer can still hear it
//!
//! ### State Broadcasting
//! After every tick each joined session receives either a full keyframe snapshot or a
//! delta against the previous broadcast. A peer that just joined gets a `JoinAck`
//! carrying the complete post-tick snapshot instead.
//!
//! ## Architecture Design
//!
//! ### Sans-IO Game Loop
//! [`game_loop::GameLoop`] contains the entire tick pipeline and touches sockets only
//! through non-blocking channels. The [`network`] module owns the TCP listener, the
//! per-connection reader/writer tasks and the timer, and simply calls `run_tick` once
//! per interval. Tests drive the loop directly, tick by tick.
//!
//! ### Deterministic Core
//! [`game::WorldState`] keeps players and projectiles in ordered maps and draws every
//! random choice from one seeded generator, so identical inputs reproduce identical
//! worlds.
//!
//! ### Embedded Peers
//! Bots and a locally hosted player attach through in-process transports. They go
//! through the same `Join`/`Input` flow as remote peers, just without the codec.
//!
//! ## Module Organization
//!
//! - `game`: world state, the per-tick step and fight progression
//! - `player`, `projectile`, `boss`: the entities and the boss attack state machine
//! - `input`: latest-input-wins buffering per player
//! - `admin`: validated admin commands applied between ticks
//! - `session`: sessions, transports and the session table
//! - `game_loop`: the five-phase tick pipeline
//! - `network`: TCP listener, socket tasks and the tick timer
//! - `persistence`: saved coins and highest level
//! - `config`, `error`: runtime settings and error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 5555,
//!         bots: 2,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Binds the listener; no save file, so progress starts fresh.
//!     let mut server = Server::new(config, None).await?;
//!
//!     // Ticks until Ctrl+C, then disconnects every peer.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod boss;
pub mod config;
pub mod error;
pub mod game;
pub mod game_loop;
pub mod input;
pub mod network;
pub mod persistence;
pub mod player;
pub mod projectile;
pub mod session;
