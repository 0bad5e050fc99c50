//! Transaction history retrieval strategies.
//!
//! Local development nodes have no indexer, so their history is found by
//! walking back over recent blocks. Public networks delegate to an indexer:
//! either Etherscan or Alchemy's asset-transfer API.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::ServiceError;
use crate::explorer::Explorer;
use crate::provider::{AssetTransfersParams, ChainClient, ChainSigner, ProviderError};
use crate::types::{Block, ChainTransaction, Transaction};

/// Alchemy caps each direction at 20 transfers (`0x14`).
const ASSET_TRANSFER_MAX_COUNT: &str = "0x14";

/// Strategy for finding the transactions an address took part in.
#[async_trait]
pub trait HistoryStrategy: Send + Sync {
	/// Get the name of this strategy for logging
	fn name(&self) -> &'static str;

	async fn transactions(&self, address: Address) -> Result<Vec<Transaction>, ServiceError>;
}

/// Expand the transactions of `block`, recovering each sender with `signer`.
pub(crate) fn block_transactions(
	block: &Block,
	signer: &dyn ChainSigner,
) -> Result<Vec<Transaction>, ProviderError> {
	block
		.transactions
		.iter()
		.map(|envelope| {
			Ok(Transaction::Chain(ChainTransaction {
				from: signer.sender(envelope)?,
				envelope: envelope.clone(),
				block_number: block.number(),
				timestamp: block.timestamp(),
			}))
		})
		.collect()
}

/// Walk back from the chain head over at most `depth` blocks, newest first,
/// collecting transactions accepted by `keep` until `limit` are found.
///
/// Blocks are fetched `batch_size` at a time. A block missing from a batch is
/// logged and skipped.
pub(crate) async fn scan_recent_blocks<F>(
	client: &dyn ChainClient,
	depth: u64,
	batch_size: usize,
	limit: usize,
	keep: F,
) -> Result<Vec<Transaction>, ServiceError>
where
	F: Fn(&Transaction) -> bool + Send + Sync,
{
	if depth == 0 || limit == 0 {
		return Ok(Vec::new());
	}

	let height = client.block_height().await?;
	let identity = client.chain_identity().await?;

	// genesis carries no transactions
	let lowest = height.saturating_sub(depth.saturating_sub(1)).max(1);
	let numbers: Vec<u64> = (lowest..=height).rev().collect();
	debug!(height, lowest, "Scanning recent blocks");

	let mut found = Vec::new();
	for chunk in numbers.chunks(batch_size.max(1)) {
		let blocks = client.blocks_by_number(chunk).await?;
		for (number, slot) in chunk.iter().zip(blocks) {
			let block = match slot {
				Ok(block) => block,
				Err(e) => {
					warn!(block = number, error = %e, "Skipping block");
					continue;
				}
			};
			found.extend(
				block_transactions(&block, identity.signer.as_ref())?
					.into_iter()
					.filter(|tx| keep(tx)),
			);
		}
		if found.len() >= limit {
			break;
		}
	}

	found.truncate(limit);
	Ok(found)
}

/// Brute-force scan of recent blocks, for networks without an indexer.
pub struct TraverseHistory {
	client: Arc<dyn ChainClient>,
	scan_depth: u64,
	batch_size: usize,
	limit: usize,
}

impl TraverseHistory {
	pub fn new(client: Arc<dyn ChainClient>, scan_depth: u64, batch_size: usize, limit: usize) -> Self {
		Self {
			client,
			scan_depth,
			batch_size,
			limit,
		}
	}
}

#[async_trait]
impl HistoryStrategy for TraverseHistory {
	fn name(&self) -> &'static str {
		"traverse"
	}

	async fn transactions(&self, address: Address) -> Result<Vec<Transaction>, ServiceError> {
		scan_recent_blocks(
			self.client.as_ref(),
			self.scan_depth,
			self.batch_size,
			self.limit,
			|tx| tx.involves(address),
		)
		.await
	}
}

/// Account transaction list from a block explorer.
pub struct ExplorerHistory {
	explorer: Arc<dyn Explorer>,
}

impl ExplorerHistory {
	pub fn new(explorer: Arc<dyn Explorer>) -> Self {
		Self { explorer }
	}
}

#[async_trait]
impl HistoryStrategy for ExplorerHistory {
	fn name(&self) -> &'static str {
		"explorer"
	}

	async fn transactions(&self, address: Address) -> Result<Vec<Transaction>, ServiceError> {
		let transactions = self.explorer.account_transactions(address).await?;
		Ok(transactions.into_iter().map(Transaction::Indexed).collect())
	}
}

/// External transfers reported by `alchemy_getAssetTransfers`, resolved to
/// full transactions in one batch.
pub struct AssetTransferHistory {
	client: Arc<dyn ChainClient>,
}

impl AssetTransferHistory {
	pub fn new(client: Arc<dyn ChainClient>) -> Self {
		Self { client }
	}

	fn params(from: Option<Address>, to: Option<Address>) -> AssetTransfersParams {
		AssetTransfersParams {
			from_address: from.map(|a| a.to_string()),
			to_address: to.map(|a| a.to_string()),
			category: vec!["external".to_string()],
			order: Some("desc".to_string()),
			max_count: Some(ASSET_TRANSFER_MAX_COUNT.to_string()),
			..Default::default()
		}
	}
}

#[async_trait]
impl HistoryStrategy for AssetTransferHistory {
	fn name(&self) -> &'static str {
		"asset-transfers"
	}

	async fn transactions(&self, address: Address) -> Result<Vec<Transaction>, ServiceError> {
		let outgoing = self
			.client
			.asset_transfers(Self::params(Some(address), None))
			.await?;
		let incoming = self
			.client
			.asset_transfers(Self::params(None, Some(address)))
			.await?;

		let mut seen = HashSet::new();
		let mut hashes = Vec::new();
		for transfer in outgoing.transfers.iter().chain(incoming.transfers.iter()) {
			match transfer.hash.parse::<B256>() {
				// self transfers show up in both directions
				Ok(hash) if seen.insert(hash) => hashes.push(hash),
				Ok(_) => {}
				Err(_) => warn!(hash = %transfer.hash, "Ignoring transfer with malformed hash"),
			}
		}

		let mut transactions: Vec<Transaction> = self
			.client
			.transactions_by_hash(&hashes)
			.await?
			.into_iter()
			.filter_map(|slot| match slot {
				Ok(tx) => Some(tx),
				Err(e) => {
					warn!(error = %e, "Skipping unresolved transfer");
					None
				}
			})
			.collect();
		transactions.sort_by(|a, b| b.block_number().cmp(&a.block_number()));

		Ok(transactions)
	}
}
