//! Ethereum chain access and synchronization core.
//!
//! - [`provider`]: JSON-RPC node client with batching, deadlines and signing.
//! - [`explorer`]: block explorer client for indexed history, sources and prices.
//! - [`service`]: resolves accounts, contracts and signers and caches them per chain.
//! - [`sync`]: follows the chain head and publishes updates on an event bus.

pub mod config;
pub mod explorer;
pub mod provider;
pub mod service;
pub mod sync;
pub mod types;
pub mod utils;
