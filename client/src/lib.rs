//! # Boss Arena Client Library
//!
//! Headless client side of the arena: a framed TCP connection to the authoritative
//! server and the loop that lets a [`shared::bot::BotController`] play over it.
//!
//! ## Architecture Overview
//!
//! The client never simulates. It sends intent (`Input` messages carrying a move
//! direction and fire/dash flags) and mirrors whatever the server broadcasts:
//!
//! - `JoinAck` carries the assigned player id and a full snapshot
//! - `WorldDelta` arrives every tick with only the fields that changed
//! - `WorldSnapshot` arrives periodically as a resync keyframe
//! - `Disconnect` carries the reason the server dropped the session
//!
//! The mirror itself ([`shared::view::WorldView`]) and the bot logic live in `shared`, so
//! a bot embedded in the server and a bot connected over TCP behave identically.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - [`network::WireClient`]: connect, send `Join`, `send` and cancel-safe `poll`
//! - [`network::run_bot`]: drives one bot at the tick rate until disconnected or stopped
//! - [`network::bot_names`]: naming for a swarm of bots
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{run_bot, BotExit};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client::network::BoxError> {
//!     let (_stop, stop_rx) = watch::channel(false);
//!     match run_bot("127.0.0.1:5555", "TestBot", 7, stop_rx).await? {
//!         BotExit::Disconnected(reason) => println!("dropped: {}", reason),
//!         BotExit::Stopped => println!("stopped"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;
