//! Remote node client.
//!
//! Everything that talks JSON-RPC to the Ethereum node goes through the
//! [`ChainClient`] trait. The production implementation is [`NodeClient`], a
//! single multiplexed alloy connection where every request carries its own
//! deadline. Tests substitute the mockall generated `MockChainClient`.

/// alloy backed node client
mod client;
/// Chain-aware transaction signers
pub mod signer;
/// Errors, identity and provider specific payloads
mod types;

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::{Block, BlockHeader, Transaction, TxnRequest};

pub use client::NodeClient;
pub use signer::{ChainBoundSigner, ChainSigner, MixedChainSigner};
pub use types::*;

/// Read and write access to one Ethereum node.
///
/// Implementations must be safe to share between the synchronizer and any
/// number of concurrent on-demand queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Vendor behind the endpoint; gates vendor specific calls.
	fn kind(&self) -> ProviderKind;

	/// Chain id and signer of the connected node, resolved once and cached.
	async fn chain_identity(&self) -> Result<ChainIdentity, ProviderError>;

	async fn chain_id(&self) -> Result<u64, ProviderError>;

	/// Forget the cached identity so the next call resolves it again.
	async fn invalidate_identity(&self);

	/// Suggested gas price in wei.
	async fn gas_price(&self) -> Result<u128, ProviderError>;

	async fn code(&self, address: Address) -> Result<Bytes, ProviderError>;

	async fn balance(&self, address: Address) -> Result<U256, ProviderError>;

	async fn block_height(&self) -> Result<u64, ProviderError>;

	async fn block_by_hash(&self, hash: B256) -> Result<Block, ProviderError>;

	async fn block_by_number(&self, number: u64) -> Result<Block, ProviderError>;

	/// Fetch several blocks in one round-trip.
	///
	/// Fails as a whole only if the round-trip fails. Otherwise returns one
	/// slot per requested number, in request order.
	async fn blocks_by_number(&self, numbers: &[u64]) -> Result<Vec<BatchItem<Block>>, ProviderError>;

	/// Fetch several transactions in one round-trip, same contract as
	/// [`ChainClient::blocks_by_number`].
	async fn transactions_by_hash(
		&self,
		hashes: &[B256],
	) -> Result<Vec<BatchItem<Transaction>>, ProviderError>;

	async fn estimate_gas(&self, from: Address, to: Address, input: Bytes) -> Result<u64, ProviderError>;

	/// `eth_call` against the latest block.
	async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ProviderError>;

	/// Sign and submit a transaction. Returns as soon as the node accepted it
	/// into its mempool.
	async fn send_transaction(&self, request: TxnRequest) -> Result<B256, ProviderError>;

	/// Stream of new block headers pushed by the node.
	async fn subscribe_new_heads(&self) -> Result<BoxStream<'static, BlockHeader>, ProviderError>;

	/// `alchemy_getAssetTransfers`, only available on Alchemy endpoints.
	async fn asset_transfers(
		&self,
		params: AssetTransfersParams,
	) -> Result<AssetTransfersResult, ProviderError>;
}
