use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use tracing::info;

use super::{Account, Contract, ServiceError};
use crate::types::TxnRequest;

/// Gas used by a plain ether transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// An operator controlled wallet able to author transactions.
///
/// Signers are session-local: they are never cached or persisted.
pub struct Signer {
	account: Arc<Account>,
	key: PrivateKeySigner,
}

impl Signer {
	pub(crate) fn new(account: Arc<Account>, key: PrivateKeySigner) -> Self {
		Self { account, key }
	}

	pub fn account(&self) -> &Arc<Account> {
		&self.account
	}

	pub fn address(&self) -> Address {
		self.account.address()
	}

	/// Send `amount` wei to `to`. Returns once the node accepted the
	/// transaction.
	pub async fn transfer_to(&self, to: Address, amount: U256) -> Result<B256, ServiceError> {
		let client = self.account.client();
		let gas_price = client.gas_price().await?;

		let hash = client
			.send_transaction(TxnRequest {
				key: self.key.clone(),
				to: Some(to),
				value: amount,
				input: Bytes::new(),
				gas_limit: Some(TRANSFER_GAS),
				gas_price: Some(gas_price),
			})
			.await?;

		info!(%hash, from = %self.address(), %to, %amount, "Submitted transfer");
		Ok(hash)
	}

	/// Invoke a state changing method of `contract`.
	pub async fn call_contract(
		&self,
		contract: &Contract,
		method: &str,
		args: &[String],
	) -> Result<B256, ServiceError> {
		let client = self.account.client();
		let (_, input) = contract.encode_call(method, args)?;

		let gas_price = client.gas_price().await?;
		let gas_limit = client
			.estimate_gas(self.address(), contract.address(), input.clone())
			.await?;

		let hash = client
			.send_transaction(TxnRequest {
				key: self.key.clone(),
				to: Some(contract.address()),
				value: U256::ZERO,
				input,
				gas_limit: Some(gas_limit),
				gas_price: Some(gas_price),
			})
			.await?;

		info!(%hash, contract = %contract.address(), method, "Submitted contract call");
		Ok(hash)
	}
}

impl fmt::Debug for Signer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signer")
			.field("address", &self.address())
			.finish_non_exhaustive()
	}
}
