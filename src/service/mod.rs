//! Domain resolver.
//!
//! [`Service`] turns raw addresses into [`Account`]s, [`Contract`]s and
//! [`Signer`]s, keeps them in an [`ObjectCache`] keyed by chain id and address,
//! and answers history queries with the [`HistoryStrategy`] matching the
//! connected network.
//!
//! Resolution failures are returned to the caller as they are; nothing in
//! this layer retries.

/// Accounts and balance caching
mod account;
/// Object cache
mod cache;
/// Contracts and ABI driven calls
mod contract;
/// Error types
mod error;
/// Transaction history strategies
mod history;
/// Network metadata and classification
mod network;
/// Operator controlled signers
mod signer;
/// Cancellable background queries
mod task;

use std::str::FromStr;
use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use tracing::{debug, info};

use crate::config::{Config, HistorySource};
use crate::explorer::{EtherscanClient, Explorer};
use crate::provider::{ChainClient, NodeClient};
use crate::types::{Block, Transaction};
use crate::utils::trim_0x;

pub use account::{Account, AccountType};
pub use cache::{CacheKey, CachedObject, Expiration, ObjectCache};
pub use contract::Contract;
pub use error::ServiceError;
pub use history::{AssetTransferHistory, ExplorerHistory, HistoryStrategy, TraverseHistory};
pub use network::{ChainRegistry, NetType, Network};
pub use signer::{Signer, TRANSFER_GAS};
pub use task::{QueryHandle, spawn_query};

/// Entry point for on-demand chain queries.
pub struct Service {
	config: Config,
	client: Arc<dyn ChainClient>,
	explorer: Arc<dyn Explorer>,
	registry: Arc<ChainRegistry>,
	cache: ObjectCache,
}

impl Service {
	pub fn new(
		config: Config,
		client: Arc<dyn ChainClient>,
		explorer: Arc<dyn Explorer>,
		registry: Arc<ChainRegistry>,
	) -> Self {
		Self {
			config,
			client,
			explorer,
			registry,
			cache: ObjectCache::new(),
		}
	}

	/// Connect to the node and explorer described by `config`.
	pub async fn connect(config: Config, registry: Arc<ChainRegistry>) -> Result<Self, ServiceError> {
		let client = NodeClient::connect(&config.endpoint(), config.provider, config.request_timeout())
			.await?;
		let explorer = EtherscanClient::new(
			config.etherscan_endpoint(),
			config.etherscan_api_key.clone(),
			config.request_timeout(),
		)?;

		Ok(Self::new(config, Arc::new(client), Arc::new(explorer), registry))
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// The node client shared with the synchronizer.
	pub fn client(&self) -> &Arc<dyn ChainClient> {
		&self.client
	}

	pub fn cache(&self) -> &ObjectCache {
		&self.cache
	}

	/// The network the node is connected to.
	pub async fn network(&self) -> Result<Network, ServiceError> {
		let chain_id = self.client.chain_id().await?;
		Ok(self.registry.lookup(chain_id))
	}

	pub async fn block_height(&self) -> Result<u64, ServiceError> {
		Ok(self.client.block_height().await?)
	}

	/// Suggested gas price in wei.
	pub async fn gas_price(&self) -> Result<u128, ServiceError> {
		Ok(self.client.gas_price().await?)
	}

	/// Ether price in USD.
	pub async fn eth_price(&self) -> Result<f64, ServiceError> {
		Ok(self.explorer.eth_price().await?)
	}

	async fn cache_key(&self, address: Address) -> Result<CacheKey, ServiceError> {
		Ok(CacheKey::new(self.client.chain_id().await?, address))
	}

	/// Resolve a hex encoded address.
	pub async fn get_account(&self, address: &str) -> Result<Arc<Account>, ServiceError> {
		let address = Address::from_str(address.trim()).map_err(|e| ServiceError::InvalidAddress {
			input: address.to_string(),
			reason: e.to_string(),
		})?;
		self.resolve_account(address).await
	}

	/// Look up `address`, fetching its code on a cache miss.
	///
	/// A cached account has its balance cleared so the next read is fresh.
	pub async fn resolve_account(&self, address: Address) -> Result<Arc<Account>, ServiceError> {
		let key = self.cache_key(address).await?;
		if let Some(account) = self.cache.account(&key) {
			debug!(%address, "Account cache hit");
			account.clear_cache();
			return Ok(account);
		}

		let code = self.client.code(address).await?;
		let account = Arc::new(Account::new(self.client.clone(), address, code));
		debug!(%address, account_type = %account.account_type(), "Resolved account");

		Ok(self.cache.insert_account(key, account, Expiration::Never))
	}

	/// Resolve the contract at `address`.
	pub async fn get_contract(&self, address: Address) -> Result<Arc<Contract>, ServiceError> {
		let key = self.cache_key(address).await?;
		if let Some(contract) = self.cache.contract(&key) {
			debug!(%address, "Contract cache hit");
			return Ok(contract);
		}

		let account = self.resolve_account(address).await?;
		self.to_contract(account).await
	}

	/// Upgrade a resolved account to a contract.
	///
	/// On development networks the contract has no ABI until one is imported.
	/// Elsewhere the verified source is looked up on the explorer; unverified
	/// contracts are returned without ABI.
	pub async fn to_contract(&self, account: Arc<Account>) -> Result<Arc<Contract>, ServiceError> {
		let address = account.address();
		if !account.is_contract() {
			return Err(ServiceError::NotAContract(address));
		}

		let key = self.cache_key(address).await?;
		if let Some(contract) = self.cache.contract(&key) {
			return Ok(contract);
		}

		let network = self.network().await?;
		let contract = if network.net_type() == NetType::Devnet {
			Contract::skeleton(account)
		} else {
			match self.explorer.source_code(address).await? {
				Some(verified) => {
					info!(%address, name = %verified.contract_name, "Loaded verified contract source");
					Contract::verified(account, verified)
				}
				None => {
					debug!(%address, "Contract source is not verified");
					Contract::skeleton(account)
				}
			}
		};

		Ok(self.cache.insert_contract(
			key,
			Arc::new(contract),
			Expiration::After(self.config.contract_ttl()),
		))
	}

	/// Build a signer from a hex encoded private key. Signers are not cached.
	pub fn get_signer(&self, private_key: &str) -> Result<Signer, ServiceError> {
		let key = PrivateKeySigner::from_str(trim_0x(private_key.trim()))
			.map_err(|e| ServiceError::InvalidKey(e.to_string()))?;
		let account = Account::new(self.client.clone(), key.address(), Bytes::new());
		Ok(Signer::new(Arc::new(account), key))
	}

	/// Transactions of the last `n` blocks, newest first.
	pub async fn get_latest_transactions(&self, n: u64) -> Result<Vec<Transaction>, ServiceError> {
		history::scan_recent_blocks(
			self.client.as_ref(),
			n,
			self.config.history_batch_size,
			usize::MAX,
			|_| true,
		)
		.await
	}

	/// Transactions of `block` with their senders recovered.
	pub async fn transactions_by_block(&self, block: &Block) -> Result<Vec<Transaction>, ServiceError> {
		let identity = self.client.chain_identity().await?;
		Ok(history::block_transactions(block, identity.signer.as_ref())?)
	}

	fn history_strategy(&self, net_type: NetType) -> Box<dyn HistoryStrategy> {
		match (net_type, self.config.history_source) {
			(NetType::Devnet, _) => Box::new(TraverseHistory::new(
				self.client.clone(),
				self.config.history_scan_depth,
				self.config.history_batch_size,
				self.config.history_limit,
			)),
			(_, HistorySource::Etherscan) => Box::new(ExplorerHistory::new(self.explorer.clone())),
			(_, HistorySource::Alchemy) => Box::new(AssetTransferHistory::new(self.client.clone())),
		}
	}

	/// Transactions sent or received by `address`.
	pub async fn get_transaction_history(
		&self,
		address: Address,
	) -> Result<Vec<Transaction>, ServiceError> {
		let network = self.network().await?;
		let strategy = self.history_strategy(network.net_type());
		debug!(
			%address,
			network = %network.name,
			strategy = strategy.name(),
			"Fetching transaction history"
		);
		strategy.transactions(address).await
	}

	/// Send `amount` wei from `signer` to `to`.
	pub async fn transfer(&self, signer: &Signer, to: Address, amount: U256) -> Result<B256, ServiceError> {
		signer.transfer_to(to, amount).await
	}

	/// Read-only call of a contract method.
	pub async fn call_contract(
		&self,
		contract: &Contract,
		method: &str,
		args: &[String],
	) -> Result<Vec<DynSolValue>, ServiceError> {
		contract.call(method, args).await
	}

	/// Submit a state changing contract call authored by `signer`.
	pub async fn send_contract_call(
		&self,
		signer: &Signer,
		contract: &Contract,
		method: &str,
		args: &[String],
	) -> Result<B256, ServiceError> {
		signer.call_contract(contract, method, args).await
	}

	/// Drop everything cached for `address` on the current chain.
	pub async fn invalidate(&self, address: Address) -> Result<(), ServiceError> {
		let key = self.cache_key(address).await?;
		self.cache.invalidate(&key);
		Ok(())
	}
}
