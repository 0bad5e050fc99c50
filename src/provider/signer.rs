//! Chain-aware transaction signers.
//!
//! A [`ChainSigner`] knows how to compute the signing hash of a transaction,
//! recover its sender and sign new transactions for a particular chain. The
//! [`MixedChainSigner`] handles streams where transactions minted for several
//! chains show up side by side, building one [`ChainBoundSigner`] per chain id
//! the first time that id is seen.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{SignableTransaction, Transaction as _, TxEnvelope, TxLegacy};
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use parking_lot::RwLock;
use tracing::debug;

use super::types::ProviderError;

/// Signing and sender recovery bound to chain ids.
pub trait ChainSigner: Send + Sync + fmt::Debug {
	/// The chain new transactions are signed for.
	fn chain_id(&self) -> u64;

	/// Canonical hash that the transaction's signature commits to.
	fn signature_hash(&self, tx: &TxEnvelope) -> Result<B256, ProviderError>;

	/// Recover the address that signed `tx`.
	fn sender(&self, tx: &TxEnvelope) -> Result<Address, ProviderError>;

	/// Sign an unsigned legacy transaction with `key`, replay-protected for
	/// [`ChainSigner::chain_id`].
	fn sign(&self, tx: TxLegacy, key: &PrivateKeySigner) -> Result<TxEnvelope, ProviderError>;
}

/// Signer for exactly one chain id.
///
/// Transactions carrying a different chain id are rejected. Legacy
/// transactions without replay protection are accepted on any chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBoundSigner {
	chain_id: u64,
}

impl ChainBoundSigner {
	pub fn new(chain_id: u64) -> Self {
		Self { chain_id }
	}

	fn check_chain(&self, tx: &TxEnvelope) -> Result<(), ProviderError> {
		match tx.chain_id() {
			Some(actual) if actual != self.chain_id => Err(ProviderError::InvalidChainId {
				expected: self.chain_id,
				actual,
			}),
			_ => Ok(()),
		}
	}
}

impl ChainSigner for ChainBoundSigner {
	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	fn signature_hash(&self, tx: &TxEnvelope) -> Result<B256, ProviderError> {
		self.check_chain(tx)?;
		Ok(tx.signature_hash())
	}

	fn sender(&self, tx: &TxEnvelope) -> Result<Address, ProviderError> {
		self.check_chain(tx)?;
		tx.recover_signer().map_err(|e| {
			ProviderError::Malformed(format!(
				"cannot recover sender of {}: {}",
				tx.tx_hash(),
				e
			))
		})
	}

	fn sign(&self, mut tx: TxLegacy, key: &PrivateKeySigner) -> Result<TxEnvelope, ProviderError> {
		tx.chain_id = Some(self.chain_id);
		let signature = key
			.sign_transaction_sync(&mut tx)
			.map_err(|e| ProviderError::Signing(e.to_string()))?;
		Ok(TxEnvelope::Legacy(tx.into_signed(signature)))
	}
}

/// Signer that accepts transactions from any chain.
///
/// Keeps an arena of [`ChainBoundSigner`]s keyed by chain id, populated on
/// demand. Transactions without a chain id, and all newly signed
/// transactions, use the default chain.
pub struct MixedChainSigner {
	default_chain_id: u64,
	signers: RwLock<HashMap<u64, Arc<ChainBoundSigner>>>,
}

impl MixedChainSigner {
	pub fn new(default_chain_id: u64) -> Self {
		Self {
			default_chain_id,
			signers: RwLock::new(HashMap::new()),
		}
	}

	/// Chain ids for which a bound signer has been built, ascending.
	pub fn known_chains(&self) -> Vec<u64> {
		let mut ids: Vec<u64> = self.signers.read().keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	fn signer_for(&self, chain_id: u64) -> Arc<ChainBoundSigner> {
		if let Some(signer) = self.signers.read().get(&chain_id) {
			return signer.clone();
		}

		self.signers
			.write()
			.entry(chain_id)
			.or_insert_with(|| {
				debug!(chain_id, "Creating signer for newly observed chain");
				Arc::new(ChainBoundSigner::new(chain_id))
			})
			.clone()
	}

	fn signer_of(&self, tx: &TxEnvelope) -> Arc<ChainBoundSigner> {
		self.signer_for(tx.chain_id().unwrap_or(self.default_chain_id))
	}
}

impl fmt::Debug for MixedChainSigner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MixedChainSigner")
			.field("default_chain_id", &self.default_chain_id)
			.field("known_chains", &self.known_chains())
			.finish()
	}
}

impl ChainSigner for MixedChainSigner {
	fn chain_id(&self) -> u64 {
		self.default_chain_id
	}

	fn signature_hash(&self, tx: &TxEnvelope) -> Result<B256, ProviderError> {
		self.signer_of(tx).signature_hash(tx)
	}

	fn sender(&self, tx: &TxEnvelope) -> Result<Address, ProviderError> {
		self.signer_of(tx).sender(tx)
	}

	fn sign(&self, tx: TxLegacy, key: &PrivateKeySigner) -> Result<TxEnvelope, ProviderError> {
		self.signer_for(self.default_chain_id).sign(tx, key)
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use alloy::consensus::Transaction as _;
	use alloy::primitives::{TxKind, U256};

	pub(crate) fn legacy_tx(nonce: u64, to: Address, value: u64) -> TxLegacy {
		TxLegacy {
			chain_id: None,
			nonce,
			gas_price: 1_000_000_000,
			gas_limit: 21_000,
			to: TxKind::Call(to),
			value: U256::from(value),
			input: Default::default(),
		}
	}

	pub(crate) fn signed_on(chain_id: u64, key: &PrivateKeySigner, tx: TxLegacy) -> TxEnvelope {
		ChainBoundSigner::new(chain_id).sign(tx, key).unwrap()
	}

	#[test]
	fn test_bound_signer_recovers_sender() {
		let key = PrivateKeySigner::random();
		let tx = signed_on(1, &key, legacy_tx(0, Address::repeat_byte(0x22), 10));

		let signer = ChainBoundSigner::new(1);
		assert_eq!(tx.chain_id(), Some(1));
		assert_eq!(signer.sender(&tx).unwrap(), key.address());
		assert_eq!(signer.signature_hash(&tx).unwrap(), tx.signature_hash());
	}

	#[test]
	fn test_bound_signer_rejects_other_chain() {
		let key = PrivateKeySigner::random();
		let tx = signed_on(5, &key, legacy_tx(0, Address::repeat_byte(0x22), 10));

		let err = ChainBoundSigner::new(1).sender(&tx).unwrap_err();
		assert!(matches!(
			err,
			ProviderError::InvalidChainId {
				expected: 1,
				actual: 5
			}
		));
	}

	#[test]
	fn test_bound_signer_accepts_unprotected_legacy() {
		let key = PrivateKeySigner::random();
		let mut tx = legacy_tx(3, Address::repeat_byte(0x33), 1);
		let signature = key.sign_transaction_sync(&mut tx).unwrap();
		let envelope = TxEnvelope::Legacy(tx.into_signed(signature));

		assert_eq!(envelope.chain_id(), None);
		assert_eq!(
			ChainBoundSigner::new(31337).sender(&envelope).unwrap(),
			key.address()
		);
	}

	#[test]
	fn test_mixed_signer_handles_multiple_chains() {
		let mainnet_key = PrivateKeySigner::random();
		let goerli_key = PrivateKeySigner::random();
		let on_mainnet = signed_on(1, &mainnet_key, legacy_tx(0, Address::repeat_byte(1), 1));
		let on_goerli = signed_on(5, &goerli_key, legacy_tx(0, Address::repeat_byte(2), 2));

		let mixed = MixedChainSigner::new(1);
		assert!(mixed.known_chains().is_empty());

		assert_eq!(mixed.sender(&on_mainnet).unwrap(), mainnet_key.address());
		assert_eq!(mixed.sender(&on_goerli).unwrap(), goerli_key.address());
		// second pass goes through the cached signers
		assert_eq!(mixed.sender(&on_goerli).unwrap(), goerli_key.address());
		assert_eq!(mixed.sender(&on_mainnet).unwrap(), mainnet_key.address());

		assert_eq!(mixed.known_chains(), vec![1, 5]);
	}

	#[test]
	fn test_mixed_signer_signs_for_default_chain() {
		let key = PrivateKeySigner::random();
		let mixed = MixedChainSigner::new(31337);

		let tx = mixed
			.sign(legacy_tx(7, Address::repeat_byte(9), 100), &key)
			.unwrap();

		assert_eq!(tx.chain_id(), Some(31337));
		assert_eq!(tx.nonce(), 7);
		assert_eq!(mixed.sender(&tx).unwrap(), key.address());
	}
}
