//! Round-robin league coordination over a localhost JSON-RPC fabric.
//!
//! Three process roles share this library: the league manager owns the
//! tournament lifecycle and the canonical standings, referees conduct
//! individual matches against a pluggable game engine, and players answer
//! move requests with a pluggable strategy.

#![warn(unused_crate_dependencies)]

pub mod audit;
pub mod auth;
pub mod config;
pub mod database;
pub mod games;
pub mod logging;
pub mod manager;
pub mod player;
pub mod protocol;
pub mod referee;
pub mod transport;
pub mod utils;
