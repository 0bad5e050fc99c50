//! External indexer integration.
//!
//! Public networks have indexers that answer "all transactions of an address"
//! directly, along with verified contract sources and the ether price. This
//! module provides the [`Explorer`] seam and an Etherscan backed client.

/// HTTP client for the Etherscan API
mod client;
/// Response payloads and error types
mod types;

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::types::IndexedTransaction;

pub use client::EtherscanClient;
pub use types::*;

/// Read access to a block explorer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Explorer: Send + Sync {
	/// Most recent transactions sent or received by `address`, newest first.
	async fn account_transactions(
		&self,
		address: Address,
	) -> Result<Vec<IndexedTransaction>, ExplorerError>;

	/// Verified source and ABI of the contract at `address`, `None` if the
	/// contract was never verified.
	async fn source_code(&self, address: Address) -> Result<Option<VerifiedSource>, ExplorerError>;

	/// Current ether price in USD.
	async fn eth_price(&self) -> Result<f64, ExplorerError>;
}
