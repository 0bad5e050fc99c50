use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::{TxLegacy, Transaction as _};
use alloy::eips::BlockNumberOrTag;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::{ClientBuilder, RpcClient};
use alloy::rpc::types::{
	Block as RpcBlock, Transaction as RpcTransaction, TransactionRequest,
};
use alloy::transports::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::signer::MixedChainSigner;
use super::types::*;
use super::ChainClient;
use crate::types::{Block, BlockHeader, ChainTransaction, Transaction, TxnRequest};

/// JSON-RPC client for a single Ethereum node.
///
/// Owns one physical connection (HTTP or WebSocket, picked from the URL
/// scheme). Requests are multiplexed over it, so the client can be shared
/// freely behind an `Arc`.
pub struct NodeClient {
	/// Raw client, used for batches and vendor specific methods.
	rpc: RpcClient,
	/// Typed provider over the same connection.
	provider: RootProvider,
	kind: ProviderKind,
	/// Deadline applied to every request.
	timeout: Duration,
	identity: Mutex<Option<ChainIdentity>>,
}

impl NodeClient {
	/// Connect to the node at `url`.
	///
	/// # Arguments
	/// * `url` - Node endpoint; `ws://`, `wss://`, `http://` or `https://`.
	/// * `kind` - Vendor behind the endpoint.
	/// * `timeout` - Deadline for the connection attempt and for every later request.
	pub async fn connect(
		url: &str,
		kind: ProviderKind,
		timeout: Duration,
	) -> Result<Self, ProviderError> {
		info!(%kind, "Connecting to node");

		let rpc = tokio::time::timeout(timeout, ClientBuilder::default().connect(url))
			.await
			.map_err(|_| ProviderError::Timeout {
				operation: "connect",
				after: timeout,
			})??;

		Ok(Self::from_rpc(rpc, kind, timeout))
	}

	/// Wrap an already built RPC client.
	pub fn from_rpc(rpc: RpcClient, kind: ProviderKind, timeout: Duration) -> Self {
		Self {
			provider: RootProvider::new(rpc.clone()),
			rpc,
			kind,
			timeout,
			identity: Mutex::new(None),
		}
	}

	async fn with_timeout<F, T>(&self, operation: &'static str, request: F) -> Result<T, ProviderError>
	where
		F: IntoFuture<Output = TransportResult<T>>,
	{
		match tokio::time::timeout(self.timeout, request.into_future()).await {
			Ok(result) => result.map_err(ProviderError::from),
			Err(_) => {
				warn!(operation, timeout = ?self.timeout, "Request timed out");
				Err(ProviderError::Timeout {
					operation,
					after: self.timeout,
				})
			}
		}
	}

	/// Send `method` once per entry of `params` in a single round-trip.
	///
	/// The outer result is the round-trip; the inner results are per slot.
	async fn batch<P, R>(
		&self,
		method: &'static str,
		params: &[P],
	) -> Result<Vec<TransportResult<Option<R>>>, ProviderError>
	where
		P: Serialize + Clone + fmt::Debug + Send + Sync + Unpin,
		R: DeserializeOwned + fmt::Debug + Send + Sync + Unpin + 'static,
	{
		if params.is_empty() {
			return Ok(Vec::new());
		}

		let mut batch = self.rpc.new_batch();
		let mut waiters = Vec::with_capacity(params.len());
		for param in params {
			waiters.push(batch.add_call::<P, Option<R>>(method, param)?);
		}

		let round_trip = async move {
			batch.send().await?;
			Ok::<_, TransportError>(futures::future::join_all(waiters).await)
		};

		debug!(method, size = params.len(), "Sending batch request");
		self.with_timeout(method, round_trip).await
	}

	async fn estimate(&self, request: TransactionRequest) -> Result<u64, ProviderError> {
		self.with_timeout("eth_estimateGas", self.provider.estimate_gas(request))
			.await
	}
}

impl fmt::Debug for NodeClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NodeClient")
			.field("kind", &self.kind)
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

/// Turn per-slot batch responses into [`BatchItem`]s.
///
/// A `null` slot becomes [`ProviderError::NotFound`] naming its key; slot level
/// errors (error responses, undecodable payloads) keep their own
/// classification.
fn collect_batch<K, T>(keys: &[K], slots: Vec<TransportResult<Option<T>>>) -> Vec<BatchItem<T>>
where
	K: fmt::Display,
{
	keys.iter()
		.zip(slots)
		.map(|(key, slot)| match slot {
			Ok(Some(value)) => Ok(value),
			Ok(None) => Err(ProviderError::NotFound(key.to_string())),
			Err(e) => Err(e.into()),
		})
		.collect()
}

fn into_chain_transaction(tx: RpcTransaction) -> Transaction {
	let block_number = tx.block_number.unwrap_or_default();
	let from = tx.inner.signer();
	Transaction::Chain(ChainTransaction {
		envelope: tx.inner.into_inner(),
		from,
		block_number,
		// eth_getTransactionByHash does not report the block time
		timestamp: 0,
	})
}

#[async_trait]
impl ChainClient for NodeClient {
	fn kind(&self) -> ProviderKind {
		self.kind
	}

	async fn chain_identity(&self) -> Result<ChainIdentity, ProviderError> {
		let mut identity = self.identity.lock().await;
		if let Some(identity) = identity.as_ref() {
			return Ok(identity.clone());
		}

		let chain_id = self
			.with_timeout("eth_chainId", self.provider.get_chain_id())
			.await?;
		info!(chain_id, "Resolved chain identity");

		let resolved = ChainIdentity {
			chain_id,
			signer: Arc::new(MixedChainSigner::new(chain_id)),
		};
		*identity = Some(resolved.clone());
		Ok(resolved)
	}

	async fn chain_id(&self) -> Result<u64, ProviderError> {
		Ok(self.chain_identity().await?.chain_id)
	}

	async fn invalidate_identity(&self) {
		if self.identity.lock().await.take().is_some() {
			debug!("Chain identity invalidated");
		}
	}

	async fn gas_price(&self) -> Result<u128, ProviderError> {
		self.with_timeout("eth_gasPrice", self.provider.get_gas_price())
			.await
	}

	async fn code(&self, address: Address) -> Result<Bytes, ProviderError> {
		self.with_timeout("eth_getCode", self.provider.get_code_at(address))
			.await
	}

	async fn balance(&self, address: Address) -> Result<U256, ProviderError> {
		self.with_timeout("eth_getBalance", self.provider.get_balance(address))
			.await
	}

	async fn block_height(&self) -> Result<u64, ProviderError> {
		self.with_timeout("eth_blockNumber", self.provider.get_block_number())
			.await
	}

	async fn block_by_hash(&self, hash: B256) -> Result<Block, ProviderError> {
		self.with_timeout(
			"eth_getBlockByHash",
			self.provider.get_block_by_hash(hash).full(),
		)
		.await?
		.map(Block::from)
		.ok_or_else(|| ProviderError::NotFound(format!("block {hash}")))
	}

	async fn block_by_number(&self, number: u64) -> Result<Block, ProviderError> {
		self.with_timeout(
			"eth_getBlockByNumber",
			self.provider
				.get_block_by_number(BlockNumberOrTag::Number(number))
				.full(),
		)
		.await?
		.map(Block::from)
		.ok_or_else(|| ProviderError::NotFound(format!("block #{number}")))
	}

	async fn blocks_by_number(&self, numbers: &[u64]) -> Result<Vec<BatchItem<Block>>, ProviderError> {
		let params: Vec<(BlockNumberOrTag, bool)> = numbers
			.iter()
			.map(|number| (BlockNumberOrTag::Number(*number), true))
			.collect();
		let slots = self
			.batch::<_, RpcBlock>("eth_getBlockByNumber", &params)
			.await?;
		let keys: Vec<String> = numbers.iter().map(|n| format!("block #{n}")).collect();

		Ok(collect_batch(&keys, slots)
			.into_iter()
			.map(|slot| slot.map(Block::from))
			.collect())
	}

	async fn transactions_by_hash(
		&self,
		hashes: &[B256],
	) -> Result<Vec<BatchItem<Transaction>>, ProviderError> {
		let params: Vec<(B256,)> = hashes.iter().map(|hash| (*hash,)).collect();
		let slots = self
			.batch::<_, RpcTransaction>("eth_getTransactionByHash", &params)
			.await?;
		let keys: Vec<String> = hashes.iter().map(|h| format!("transaction {h}")).collect();

		Ok(collect_batch(&keys, slots)
			.into_iter()
			.map(|slot| slot.map(into_chain_transaction))
			.collect())
	}

	async fn estimate_gas(&self, from: Address, to: Address, input: Bytes) -> Result<u64, ProviderError> {
		self.estimate(
			TransactionRequest::default()
				.with_from(from)
				.with_to(to)
				.with_input(input),
		)
		.await
	}

	async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ProviderError> {
		let request = TransactionRequest::default().with_to(to).with_input(input);
		self.with_timeout("eth_call", self.provider.call(request))
			.await
	}

	async fn send_transaction(&self, request: TxnRequest) -> Result<B256, ProviderError> {
		let identity = self.chain_identity().await?;
		let from = request.sender();

		let nonce = self
			.with_timeout(
				"eth_getTransactionCount",
				self.provider.get_transaction_count(from).pending(),
			)
			.await?;

		let gas_limit = match request.gas_limit {
			Some(gas_limit) => gas_limit,
			None => {
				let mut estimate = TransactionRequest::default()
					.with_from(from)
					.with_value(request.value)
					.with_input(request.input.clone());
				match request.to {
					Some(to) => estimate.set_to(to),
					None => estimate.set_deploy_code(request.input.clone()),
				}
				self.estimate(estimate).await?
			}
		};

		let gas_price = match request.gas_price {
			Some(gas_price) => gas_price,
			None => self.gas_price().await?,
		};

		let unsigned = TxLegacy {
			chain_id: None,
			nonce,
			gas_price,
			gas_limit,
			to: request.to.map_or(TxKind::Create, TxKind::Call),
			value: request.value,
			input: request.input.clone(),
		};
		let signed = identity.signer.sign(unsigned, &request.key)?;
		let hash = *signed.tx_hash();
		let encoded = signed.encoded_2718();

		let pending = self
			.with_timeout(
				"eth_sendRawTransaction",
				self.provider.send_raw_transaction(&encoded),
			)
			.await?;
		if *pending.tx_hash() != hash {
			warn!(%hash, reported = %pending.tx_hash(), "Node reported another transaction hash");
		}

		info!(
			%hash,
			%from,
			nonce = signed.nonce(),
			gas_limit,
			"Transaction submitted"
		);
		Ok(hash)
	}

	async fn subscribe_new_heads(&self) -> Result<BoxStream<'static, BlockHeader>, ProviderError> {
		let subscription = self
			.with_timeout("eth_subscribe", self.provider.subscribe_blocks())
			.await?;
		debug!("Subscribed to new heads");
		Ok(subscription.into_stream().map(BlockHeader::from).boxed())
	}

	async fn asset_transfers(
		&self,
		params: AssetTransfersParams,
	) -> Result<AssetTransfersResult, ProviderError> {
		if self.kind != ProviderKind::Alchemy {
			return Err(ProviderError::Unsupported(format!(
				"alchemy_getAssetTransfers on {} provider",
				self.kind
			)));
		}

		self.with_timeout(
			"alchemy_getAssetTransfers",
			self.rpc.request("alchemy_getAssetTransfers", (params,)),
		)
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::provider::signer::tests::signed_on;
	use alloy::consensus::Transaction as _;
	use alloy::primitives::{U64, U128};
	use alloy::signers::local::PrivateKeySigner;
	use alloy::transports::mock::Asserter;

	const HARDHAT: u64 = 31337;

	fn offline_client(kind: ProviderKind) -> NodeClient {
		// nothing listens on the discard port
		let rpc = ClientBuilder::default().http("http://127.0.0.1:9".parse().unwrap());
		NodeClient::from_rpc(rpc, kind, Duration::from_secs(5))
	}

	/// Client answering from `asserter`, one queued response per request.
	fn mocked_client(asserter: &Asserter) -> NodeClient {
		NodeClient::from_rpc(
			RpcClient::mocked(asserter.clone()),
			ProviderKind::Local,
			Duration::from_secs(5),
		)
	}

	#[tokio::test]
	async fn test_chain_identity_is_cached_until_invalidated() {
		let asserter = Asserter::new();
		let client = mocked_client(&asserter);

		// a second eth_chainId would find the queue empty and fail
		asserter.push_success(&U64::from(1));
		assert_eq!(client.chain_id().await.unwrap(), 1);
		let identity = client.chain_identity().await.unwrap();
		assert_eq!(identity.chain_id, 1);
		assert_eq!(identity.signer.chain_id(), 1);

		client.invalidate_identity().await;
		asserter.push_success(&U64::from(HARDHAT));
		assert_eq!(client.chain_id().await.unwrap(), HARDHAT);
		assert_eq!(client.chain_id().await.unwrap(), HARDHAT);
	}

	#[tokio::test]
	async fn test_send_transaction_signs_for_node_chain() {
		let asserter = Asserter::new();
		let client = mocked_client(&asserter);
		let key = PrivateKeySigner::random();
		let to = Address::repeat_byte(0x44);

		let expected = signed_on(
			HARDHAT,
			&key,
			TxLegacy {
				chain_id: None,
				nonce: 7,
				gas_price: 2_000_000_000,
				gas_limit: 21_000,
				to: TxKind::Call(to),
				value: U256::from(5),
				input: Bytes::new(),
			},
		);

		asserter.push_success(&U64::from(HARDHAT)); // eth_chainId
		asserter.push_success(&U64::from(7)); // eth_getTransactionCount
		asserter.push_success(&U64::from(21_000)); // eth_estimateGas
		asserter.push_success(&U128::from(2_000_000_000u64)); // eth_gasPrice
		// the node's answer does not replace the hash of what was signed
		asserter.push_success(&B256::repeat_byte(0xee)); // eth_sendRawTransaction

		let hash = client
			.send_transaction(TxnRequest {
				key,
				to: Some(to),
				value: U256::from(5),
				input: Bytes::new(),
				gas_limit: None,
				gas_price: None,
			})
			.await
			.unwrap();

		assert_eq!(hash, *expected.tx_hash());
		assert_eq!(expected.nonce(), 7);
		assert_eq!(expected.chain_id(), Some(HARDHAT));
	}

	#[test]
	fn test_collect_batch_marks_missing_slot() {
		let hashes = [B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3)];
		let slots: Vec<TransportResult<Option<u64>>> = vec![Ok(Some(10)), Ok(None), Ok(Some(30))];

		let items = collect_batch(&hashes, slots);

		assert_eq!(items.len(), 3);
		assert_eq!(items[0].as_ref().unwrap(), &10);
		let missing = items[1].as_ref().unwrap_err();
		assert_eq!(missing.kind(), ErrorKind::NotFound);
		assert!(missing.to_string().contains(&hashes[1].to_string()));
		assert_eq!(items[2].as_ref().unwrap(), &30);
	}

	#[test]
	fn test_collect_batch_keeps_slot_errors() {
		let keys = ["a", "b"];
		let deser = serde_json::from_str::<u64>("{}").unwrap_err();
		let slots: Vec<TransportResult<Option<u64>>> =
			vec![Err(TransportError::deser_err(deser, "{}")), Ok(Some(1))];

		let items = collect_batch(&keys, slots);

		assert_eq!(items[0].as_ref().unwrap_err().kind(), ErrorKind::Malformed);
		assert!(items[1].is_ok());
	}

	#[tokio::test]
	async fn test_asset_transfers_unsupported_on_local() {
		let client = offline_client(ProviderKind::Local);

		let err = client
			.asset_transfers(AssetTransfersParams::default())
			.await
			.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::Unsupported);
	}

	#[tokio::test]
	async fn test_empty_batch_skips_round_trip() {
		let client = offline_client(ProviderKind::Local);

		let items = client.transactions_by_hash(&[]).await.unwrap();
		assert!(items.is_empty());
	}

	#[tokio::test]
	async fn test_unreachable_node_is_retryable() {
		let client = offline_client(ProviderKind::Local);

		let err = client.block_height().await.unwrap_err();
		assert!(err.kind().is_retryable(), "unexpected error: {err}");
	}
}
