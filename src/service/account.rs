use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::ServiceError;
use crate::provider::ChainClient;

/// The two kinds of Ethereum accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountType {
	/// Externally owned account
	Wallet,
	/// Smart contract account
	Contract,
}

impl fmt::Display for AccountType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AccountType::Wallet => f.write_str("Wallet"),
			AccountType::Contract => f.write_str("Contract"),
		}
	}
}

/// An address on the connected network together with its byte code.
///
/// The balance is fetched lazily and kept until [`Account::clear_cache`].
pub struct Account {
	client: Arc<dyn ChainClient>,
	address: Address,
	/// Empty for wallets
	code: Bytes,
	balance: RwLock<Option<U256>>,
}

impl Account {
	pub(crate) fn new(client: Arc<dyn ChainClient>, address: Address, code: Bytes) -> Self {
		Self {
			client,
			address,
			code,
			balance: RwLock::new(None),
		}
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn code(&self) -> &Bytes {
		&self.code
	}

	pub fn account_type(&self) -> AccountType {
		if self.code.is_empty() {
			AccountType::Wallet
		} else {
			AccountType::Contract
		}
	}

	pub fn is_contract(&self) -> bool {
		self.account_type() == AccountType::Contract
	}

	pub(crate) fn client(&self) -> &Arc<dyn ChainClient> {
		&self.client
	}

	/// Balance in wei, fetched from the node if not cached yet.
	pub async fn balance(&self) -> Result<U256, ServiceError> {
		let cached = *self.balance.read();
		match cached {
			Some(balance) => Ok(balance),
			None => self.balance_force().await,
		}
	}

	/// Fetch the balance from the node and replace the cached value.
	///
	/// On failure the cached value becomes zero and the error is still returned.
	pub async fn balance_force(&self) -> Result<U256, ServiceError> {
		match self.client.balance(self.address).await {
			Ok(balance) => {
				*self.balance.write() = Some(balance);
				Ok(balance)
			}
			Err(e) => {
				warn!(address = %self.address, error = %e, "Failed to fetch balance");
				*self.balance.write() = Some(U256::ZERO);
				Err(e.into())
			}
		}
	}

	/// Cached balance without touching the node.
	pub fn cached_balance(&self) -> Option<U256> {
		*self.balance.read()
	}

	/// Drop the cached balance so the next read goes to the node.
	pub fn clear_cache(&self) {
		if self.balance.write().take().is_some() {
			debug!(address = %self.address, "Cleared cached balance");
		}
	}
}

impl fmt::Debug for Account {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Account")
			.field("address", &self.address)
			.field("type", &self.account_type())
			.field("balance", &self.cached_balance())
			.finish()
	}
}
