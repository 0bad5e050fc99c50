//! Domain value objects shared by the node client, the resolver and the
//! synchronizer.
//!
//! Converted from alloy's RPC response types at the client boundary.

/// Blocks and block headers
mod block;
/// Transactions from the node or from an indexer
mod transaction;

pub use block::*;
pub use transaction::*;
