use alloy::consensus::TxEnvelope;
use alloy::primitives::{Address, B256};
use alloy::rpc::types::{Block as RpcBlock, BlockTransactions, Header as RpcHeader};

/// Header of a block as pushed by a new-heads subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
	pub number: u64,
	pub hash: B256,
	pub parent_hash: B256,
	pub timestamp: u64,
}

impl From<RpcHeader> for BlockHeader {
	fn from(header: RpcHeader) -> Self {
		Self {
			number: header.inner.number,
			hash: header.hash,
			parent_hash: header.inner.parent_hash,
			timestamp: header.inner.timestamp,
		}
	}
}

/// A block with its full, still signed transactions.
///
/// Senders are not trusted from the node; they are recovered through a
/// [`ChainSigner`](crate::provider::ChainSigner) when the block is turned into
/// [`Transaction`](super::Transaction)s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	pub header: BlockHeader,
	pub miner: Address,
	pub gas_used: u64,
	pub gas_limit: u64,
	pub base_fee_per_gas: Option<u64>,
	pub transactions: Vec<TxEnvelope>,
}

impl Block {
	pub fn number(&self) -> u64 {
		self.header.number
	}

	pub fn hash(&self) -> B256 {
		self.header.hash
	}

	pub fn timestamp(&self) -> u64 {
		self.header.timestamp
	}
}

impl From<RpcBlock> for Block {
	fn from(block: RpcBlock) -> Self {
		let transactions = match block.transactions {
			BlockTransactions::Full(txs) => txs.into_iter().map(|tx| tx.inner.into_inner()).collect(),
			// hash-only responses carry nothing we can recover a sender from
			_ => Vec::new(),
		};
		let base_fee_per_gas = block.header.inner.base_fee_per_gas;

		Self {
			miner: block.header.inner.beneficiary,
			gas_used: block.header.inner.gas_used,
			gas_limit: block.header.inner.gas_limit,
			base_fee_per_gas,
			header: block.header.into(),
			transactions,
		}
	}
}
