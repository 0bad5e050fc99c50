//! Head following event loop.
//!
//! One task selects between the node's new-heads subscription and a periodic
//! tick. Each iteration handles exactly one input before selecting again, so
//! at most one block fetch is in flight. Failures of a single iteration are
//! logged and never end the loop.

use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, future::retry};
use chrono::Utc;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ChainData, EventBus, SyncError, SyncEvent, SyncProgressTracker};
use crate::provider::{ChainClient, ProviderError};
use crate::service::Service;
use crate::types::BlockHeader;

type HeadStream = BoxStream<'static, BlockHeader>;

#[derive(Default)]
struct SyncerState {
	started: bool,
	task: Option<JoinHandle<()>>,
}

/// Follows the chain and publishes updates on an [`EventBus`].
pub struct Syncer {
	service: Arc<Service>,
	bus: EventBus,
	state: Mutex<SyncerState>,
	cancel: CancellationToken,
}

impl Syncer {
	pub fn new(service: Arc<Service>, bus: EventBus) -> Self {
		Self {
			service,
			bus,
			state: Mutex::new(SyncerState::default()),
			cancel: CancellationToken::new(),
		}
	}

	pub fn bus(&self) -> &EventBus {
		&self.bus
	}

	/// Subscribe to new heads and start the loop.
	///
	/// Fails with [`SyncError::AlreadyStarted`] on every call after the first
	/// successful one, including after [`Syncer::stop`]. A failed subscription
	/// leaves the syncer unstarted.
	pub async fn start(&self) -> Result<(), SyncError> {
		let mut state = self.state.lock().await;
		if state.started {
			return Err(SyncError::AlreadyStarted);
		}

		let heads = self.service.client().subscribe_new_heads().await?;
		state.started = true;

		let sync_loop = SyncLoop {
			service: self.service.clone(),
			bus: self.bus.clone(),
			tracker: SyncProgressTracker::new(),
			cancel: self.cancel.clone(),
		};
		state.task = Some(tokio::spawn(sync_loop.run(heads)));

		info!("Synchronizer started");
		Ok(())
	}

	pub fn is_running(&self) -> bool {
		!self.cancel.is_cancelled()
			&& self
				.state
				.try_lock()
				.is_ok_and(|state| state.task.as_ref().is_some_and(|task| !task.is_finished()))
	}

	/// Stop the loop and wait for it to finish.
	pub async fn stop(&self) {
		self.cancel.cancel();
		let task = self.state.lock().await.task.take();
		if let Some(task) = task {
			if let Err(e) = task.await {
				error!(error = %e, "Synchronizer task failed");
			}
		}
	}
}

struct SyncLoop {
	service: Arc<Service>,
	bus: EventBus,
	tracker: SyncProgressTracker,
	cancel: CancellationToken,
}

impl SyncLoop {
	async fn run(mut self, heads: HeadStream) {
		let period = self.service.config().update_period();
		let mut ticker = interval_at(Instant::now() + period, period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let mut heads = Some(heads);
		let mut reconnect: Option<BoxFuture<'static, Result<HeadStream, ProviderError>>> = None;

		loop {
			tokio::select! {
				_ = self.cancel.cancelled() => break,
				head = next_head(&mut heads), if heads.is_some() => match head {
					Some(header) => self.on_new_head(header).await,
					None => {
						warn!("New heads subscription ended, resubscribing");
						heads = None;
						reconnect = Some(resubscribe(self.service.client().clone(), Duration::ZERO));
					}
				},
				stream = reconnected(&mut reconnect), if reconnect.is_some() => {
					reconnect = None;
					match stream {
						Ok(stream) => {
							info!("Resubscribed to new heads");
							heads = Some(stream);
						}
						Err(e) => {
							error!(error = %e, retry_in = ?period, "Cannot resubscribe to new heads");
							reconnect = Some(resubscribe(self.service.client().clone(), period));
						}
					}
				},
				_ = ticker.tick() => self.on_tick().await,
			}
		}

		self.tracker.log_progress(true);
		info!(stats = %self.tracker.get_stats().summary(), "Synchronizer stopped");
	}

	async fn on_new_head(&mut self, header: BlockHeader) {
		debug!(number = header.number, hash = %header.hash, "New head");
		self.tracker.record_head(header.number, header.hash);

		match self.service.client().block_by_hash(header.hash).await {
			Ok(block) => {
				self.bus.publish(SyncEvent::NewBlock(Arc::new(block)));
			}
			Err(e) => error!(number = header.number, hash = %header.hash, error = %e, "Cannot fetch block"),
		}
		self.tracker.log_progress(false);
	}

	async fn on_tick(&mut self) {
		let (price, gas_price) = tokio::join!(self.service.eth_price(), self.service.gas_price());

		let price = price.map_err(|e| error!(error = %e, "Cannot fetch ether price")).ok();
		let gas_price = gas_price
			.map_err(|e| error!(error = %e, "Cannot fetch gas price"))
			.ok();

		self.bus.publish(SyncEvent::ChainData(ChainData { price, gas_price }));
		self.bus.publish(SyncEvent::Tick { at: Utc::now() });
		self.service.cache().purge_expired();
	}
}

async fn next_head(heads: &mut Option<HeadStream>) -> Option<BlockHeader> {
	match heads {
		Some(stream) => stream.next().await,
		None => std::future::pending().await,
	}
}

async fn reconnected(
	pending: &mut Option<BoxFuture<'static, Result<HeadStream, ProviderError>>>,
) -> Result<HeadStream, ProviderError> {
	match pending {
		Some(future) => future.await,
		None => std::future::pending().await,
	}
}

/// Subscribe again after `delay`, backing off exponentially between failed
/// attempts. Gives up on the first non-retryable error.
fn resubscribe(
	client: Arc<dyn ChainClient>,
	delay: Duration,
) -> BoxFuture<'static, Result<HeadStream, ProviderError>> {
	Box::pin(async move {
		if !delay.is_zero() {
			sleep(delay).await;
		}

		let policy = ExponentialBackoff {
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		};

		retry(policy, || {
			let client = client.clone();
			async move {
				client.subscribe_new_heads().await.map_err(|e| {
					warn!(error = %e, "New heads subscription failed");
					if e.kind().is_retryable() {
						backoff::Error::transient(e)
					} else {
						backoff::Error::permanent(e)
					}
				})
			}
		})
		.await
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use crate::explorer::{ExplorerError, MockExplorer};
	use crate::provider::MockChainClient;
	use crate::service::ChainRegistry;
	use crate::sync::Topic;
	use crate::types::Block;
	use alloy::primitives::{Address, B256};
	use futures::stream;
	use std::sync::atomic::{AtomicU64, Ordering};

	fn header(number: u64) -> BlockHeader {
		BlockHeader {
			number,
			hash: B256::with_last_byte(number as u8),
			parent_hash: B256::with_last_byte(number.saturating_sub(1) as u8),
			timestamp: 1_700_000_000 + number * 12,
		}
	}

	fn block(number: u64) -> Block {
		Block {
			header: header(number),
			miner: Address::ZERO,
			gas_used: 21_000,
			gas_limit: 30_000_000,
			base_fee_per_gas: Some(7),
			transactions: vec![],
		}
	}

	fn heads(numbers: Vec<u64>) -> HeadStream {
		stream::iter(numbers.into_iter().map(header)).boxed()
	}

	fn idle_heads() -> HeadStream {
		stream::pending().boxed()
	}

	fn syncer(client: MockChainClient, explorer: MockExplorer) -> Syncer {
		let service = Service::new(
			Config::default(),
			Arc::new(client),
			Arc::new(explorer),
			Arc::new(ChainRegistry::builtin().unwrap()),
		);
		Syncer::new(Arc::new(service), EventBus::new(16))
	}

	fn block_lookup(client: &mut MockChainClient) {
		client.expect_block_by_hash().returning(|hash| {
			let number = hash.0[31] as u64;
			Ok(block(number))
		});
	}

	#[tokio::test]
	async fn test_start_twice_fails() {
		let mut client = MockChainClient::new();
		client
			.expect_subscribe_new_heads()
			.times(1)
			.returning(|| Ok(idle_heads()));
		let syncer = syncer(client, MockExplorer::new());

		syncer.start().await.unwrap();
		let err = syncer.start().await.unwrap_err();
		assert!(matches!(err, SyncError::AlreadyStarted));

		syncer.stop().await;
		assert!(!syncer.is_running());
		assert!(matches!(syncer.start().await, Err(SyncError::AlreadyStarted)));
	}

	#[tokio::test]
	async fn test_failed_start_can_be_retried() {
		let attempts = Arc::new(AtomicU64::new(0));
		let counter = attempts.clone();
		let mut client = MockChainClient::new();
		client.expect_subscribe_new_heads().returning(move || {
			if counter.fetch_add(1, Ordering::SeqCst) == 0 {
				Err(ProviderError::Unsupported("subscriptions".to_string()))
			} else {
				Ok(idle_heads())
			}
		});
		let syncer = syncer(client, MockExplorer::new());

		assert!(matches!(syncer.start().await, Err(SyncError::Provider(_))));
		syncer.start().await.unwrap();
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
		syncer.stop().await;
	}

	#[tokio::test]
	async fn test_new_head_publishes_block() {
		let mut client = MockChainClient::new();
		client
			.expect_subscribe_new_heads()
			.returning(|| Ok(heads(vec![7]).chain(idle_heads()).boxed()));
		block_lookup(&mut client);
		let syncer = syncer(client, MockExplorer::new());
		let mut blocks = syncer.bus().subscribe(Topic::NewBlock);

		syncer.start().await.unwrap();

		match blocks.recv().await {
			Some(SyncEvent::NewBlock(block)) => assert_eq!(block.number(), 7),
			other => panic!("unexpected event {other:?}"),
		}
		syncer.stop().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_tick_publishes_partial_chain_data() {
		let mut client = MockChainClient::new();
		client
			.expect_subscribe_new_heads()
			.returning(|| Ok(idle_heads()));
		client.expect_gas_price().returning(|| Ok(5_000_000_000));
		let mut explorer = MockExplorer::new();
		explorer.expect_eth_price().returning(|| {
			Err(ExplorerError::StatusError {
				status: 503,
				body: "unavailable".to_string(),
			})
		});
		let syncer = syncer(client, explorer);
		let mut chain_data = syncer.bus().subscribe(Topic::ChainData);
		let mut ticks = syncer.bus().subscribe(Topic::Tick);

		let started = Instant::now();
		syncer.start().await.unwrap();

		let event = chain_data.recv().await;
		assert_eq!(
			event,
			Some(SyncEvent::ChainData(ChainData {
				price: None,
				gas_price: Some(5_000_000_000),
			}))
		);
		// first tick comes one period after start
		assert!(started.elapsed() >= Duration::from_secs(10));
		assert!(matches!(ticks.recv().await, Some(SyncEvent::Tick { .. })));

		syncer.stop().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_resubscribes_when_stream_ends() {
		let subscriptions = Arc::new(AtomicU64::new(0));
		let counter = subscriptions.clone();
		let mut client = MockChainClient::new();
		client.expect_subscribe_new_heads().returning(move || {
			match counter.fetch_add(1, Ordering::SeqCst) {
				// first stream ends after one head
				0 => Ok(heads(vec![1])),
				_ => Ok(heads(vec![2]).chain(idle_heads()).boxed()),
			}
		});
		block_lookup(&mut client);
		client.expect_gas_price().returning(|| Ok(1));
		let mut explorer = MockExplorer::new();
		explorer.expect_eth_price().returning(|| Ok(2500.0));
		let syncer = syncer(client, explorer);
		let mut blocks = syncer.bus().subscribe(Topic::NewBlock);

		syncer.start().await.unwrap();

		let mut numbers = Vec::new();
		while numbers.len() < 2 {
			if let Some(SyncEvent::NewBlock(block)) = blocks.recv().await {
				numbers.push(block.number());
			}
		}
		assert_eq!(numbers, vec![1, 2]);
		assert_eq!(subscriptions.load(Ordering::SeqCst), 2);

		syncer.stop().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_rejected_resubscribe_waits_one_period() {
		let subscriptions = Arc::new(AtomicU64::new(0));
		let counter = subscriptions.clone();
		let mut client = MockChainClient::new();
		client.expect_subscribe_new_heads().returning(move || {
			match counter.fetch_add(1, Ordering::SeqCst) {
				0 => Ok(heads(vec![1])),
				_ => Err(ProviderError::Unsupported("eth_subscribe".to_string())),
			}
		});
		block_lookup(&mut client);
		client.expect_gas_price().returning(|| Ok(1));
		let mut explorer = MockExplorer::new();
		explorer.expect_eth_price().returning(|| Ok(2500.0));
		let syncer = syncer(client, explorer);
		let mut ticks = syncer.bus().subscribe(Topic::Tick);

		syncer.start().await.unwrap();
		tokio::time::sleep(Duration::from_secs(35)).await;

		// start, the immediate resubscribe, then one retry per 10s period
		let attempts = subscriptions.load(Ordering::SeqCst);
		assert!((4..=6).contains(&attempts), "{attempts} subscribe attempts");
		// ticks keep flowing while the subscription is down
		assert!(matches!(ticks.recv().await, Some(SyncEvent::Tick { .. })));
		assert!(syncer.is_running());

		syncer.stop().await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_block_fetch_skips_head() {
		let mut client = MockChainClient::new();
		client
			.expect_subscribe_new_heads()
			.returning(|| Ok(heads(vec![3, 4]).chain(idle_heads()).boxed()));
		client.expect_block_by_hash().returning(|hash| match hash.0[31] {
			3 => Err(ProviderError::Transport("connection reset".to_string())),
			number => Ok(block(number as u64)),
		});
		client.expect_gas_price().returning(|| Ok(1));
		let mut explorer = MockExplorer::new();
		explorer.expect_eth_price().returning(|| Ok(2500.0));
		let syncer = syncer(client, explorer);
		let mut blocks = syncer.bus().subscribe(Topic::NewBlock);
		let mut ticks = syncer.bus().subscribe(Topic::Tick);

		syncer.start().await.unwrap();

		match blocks.recv().await {
			Some(SyncEvent::NewBlock(block)) => assert_eq!(block.number(), 4),
			other => panic!("unexpected event {other:?}"),
		}
		assert!(matches!(ticks.recv().await, Some(SyncEvent::Tick { .. })));
		assert!(syncer.is_running());

		syncer.stop().await;
	}
}
