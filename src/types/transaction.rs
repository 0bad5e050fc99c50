use std::fmt;

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;

/// A transaction read from a block, with the sender recovered locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
	pub envelope: TxEnvelope,
	pub from: Address,
	pub block_number: u64,
	pub timestamp: u64,
}

/// A transaction as reported by an external indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedTransaction {
	pub block_number: u64,
	pub timestamp: u64,
	pub hash: B256,
	pub nonce: u64,
	pub block_hash: B256,
	pub transaction_index: u64,
	pub from: Address,
	/// `None` for contract creations
	pub to: Option<Address>,
	pub value: U256,
	pub gas: u64,
	pub gas_price: U256,
	pub input: Bytes,
	pub is_error: bool,
}

/// Read-only view over a transaction regardless of where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
	Chain(ChainTransaction),
	Indexed(IndexedTransaction),
}

impl Transaction {
	pub fn block_number(&self) -> u64 {
		match self {
			Transaction::Chain(tx) => tx.block_number,
			Transaction::Indexed(tx) => tx.block_number,
		}
	}

	pub fn hash(&self) -> B256 {
		match self {
			Transaction::Chain(tx) => *tx.envelope.tx_hash(),
			Transaction::Indexed(tx) => tx.hash,
		}
	}

	pub fn from(&self) -> Address {
		match self {
			Transaction::Chain(tx) => tx.from,
			Transaction::Indexed(tx) => tx.from,
		}
	}

	/// Receiver of the transaction, `None` for contract creations.
	pub fn to(&self) -> Option<Address> {
		match self {
			Transaction::Chain(tx) => tx.envelope.to(),
			Transaction::Indexed(tx) => tx.to,
		}
	}

	pub fn value(&self) -> U256 {
		match self {
			Transaction::Chain(tx) => tx.envelope.value(),
			Transaction::Indexed(tx) => tx.value,
		}
	}

	pub fn input(&self) -> &Bytes {
		match self {
			Transaction::Chain(tx) => tx.envelope.input(),
			Transaction::Indexed(tx) => &tx.input,
		}
	}

	pub fn timestamp(&self) -> u64 {
		match self {
			Transaction::Chain(tx) => tx.timestamp,
			Transaction::Indexed(tx) => tx.timestamp,
		}
	}

	pub fn is_contract_creation(&self) -> bool {
		self.to().is_none()
	}

	/// Whether `address` sent or received this transaction.
	pub fn involves(&self, address: Address) -> bool {
		self.from() == address || self.to() == Some(address)
	}
}

/// A transaction to be signed and submitted.
///
/// Gas limit and gas price are filled in from the node when absent.
#[derive(Clone)]
pub struct TxnRequest {
	pub key: PrivateKeySigner,
	pub to: Option<Address>,
	pub value: U256,
	pub input: Bytes,
	pub gas_limit: Option<u64>,
	pub gas_price: Option<u128>,
}

impl TxnRequest {
	pub fn sender(&self) -> Address {
		self.key.address()
	}
}

impl fmt::Debug for TxnRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TxnRequest")
			.field("from", &self.key.address())
			.field("to", &self.to)
			.field("value", &self.value)
			.field("input", &self.input)
			.field("gas_limit", &self.gas_limit)
			.field("gas_price", &self.gas_price)
			.finish()
	}
}
