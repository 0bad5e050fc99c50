//! Event system for chain synchronization.
//!
//! The synchronizer publishes every update on a single broadcast channel. Each
//! event belongs to one [`Topic`]; subscribers either filter for a topic or
//! register a [`SyncEventHandler`] that sees everything.
//!
//! Publishing never waits for consumers. A subscriber that falls more than the
//! channel capacity behind skips the overwritten events and is told so with a
//! warning.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::SyncError;
use crate::types::Block;
use crate::utils::to_gwei;

/// Named channel an event is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
	NewBlock,
	ChainData,
	Tick,
}

impl Topic {
	pub fn name(&self) -> &'static str {
		match self {
			Topic::NewBlock => "service:newBlock",
			Topic::ChainData => "service:chainData",
			Topic::Tick => "service:tick",
		}
	}
}

impl fmt::Display for Topic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Chain wide values refreshed on every tick. A value that could not be
/// fetched is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChainData {
	/// Ether price in USD
	pub price: Option<f64>,
	/// Suggested gas price in wei
	pub gas_price: Option<u128>,
}

/// Events published by the synchronizer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
	/// A new chain head, fetched with its transactions
	NewBlock(Arc<Block>),
	/// Chain data was refreshed
	ChainData(ChainData),
	/// The periodic refresh ran
	Tick { at: DateTime<Utc> },
}

impl SyncEvent {
	pub fn topic(&self) -> Topic {
		match self {
			SyncEvent::NewBlock(_) => Topic::NewBlock,
			SyncEvent::ChainData(_) => Topic::ChainData,
			SyncEvent::Tick { .. } => Topic::Tick,
		}
	}
}

/// Trait for handling sync events.
///
/// Each registered handler runs on its own task and receives every event in
/// publication order.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Broadcast bus shared by the synchronizer and its consumers.
#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	/// Publish `event` to every current subscriber. Returns how many
	/// subscribers were reached.
	pub fn publish(&self, event: SyncEvent) -> usize {
		let topic = event.topic();
		match self.sender.send(event) {
			Ok(receivers) => receivers,
			Err(_) => {
				debug!(%topic, "No subscribers for event");
				0
			}
		}
	}

	/// Subscribe to the events of a single topic.
	pub fn subscribe(&self, topic: Topic) -> Subscription {
		Subscription {
			receiver: self.sender.subscribe(),
			topic: Some(topic),
		}
	}

	/// Subscribe to every topic.
	pub fn subscribe_all(&self) -> Subscription {
		Subscription {
			receiver: self.sender.subscribe(),
			topic: None,
		}
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}

	/// Feed every event to `handler` on a dedicated task.
	///
	/// Errors from the handler are logged and do not stop delivery. The task
	/// ends once every clone of the bus is dropped.
	pub fn register_handler(&self, mut handler: Box<dyn SyncEventHandler>) -> JoinHandle<()> {
		let mut subscription = self.subscribe_all();
		info!(handler = handler.name(), "Registered event handler");

		tokio::spawn(async move {
			while let Some(event) = subscription.recv().await {
				if let Err(e) = handler.handle(&event).await {
					error!(
						handler = handler.name(),
						topic = %event.topic(),
						error = %e,
						"Handler failed to process event"
					);
				}
			}
			debug!(handler = handler.name(), "Event handler stopped");
		})
	}
}

/// Receiving end of an [`EventBus`] subscription.
#[derive(Debug)]
pub struct Subscription {
	receiver: broadcast::Receiver<SyncEvent>,
	topic: Option<Topic>,
}

impl Subscription {
	/// Next event of the subscribed topic, `None` once the bus is gone.
	pub async fn recv(&mut self) -> Option<SyncEvent> {
		loop {
			match self.receiver.recv().await {
				Ok(event) if self.topic.is_none_or(|topic| topic == event.topic()) => {
					return Some(event);
				}
				Ok(_) => continue,
				Err(RecvError::Lagged(skipped)) => {
					warn!(skipped, topic = ?self.topic, "Subscriber lagged behind, events dropped");
				}
				Err(RecvError::Closed) => return None,
			}
		}
	}
}

/// Handler that logs every event, used by the binary.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
		match event {
			SyncEvent::NewBlock(block) => info!(
				number = block.number(),
				hash = %block.hash(),
				transactions = block.transactions.len(),
				gas_used = block.gas_used,
				"New block"
			),
			SyncEvent::ChainData(data) => {
				let gas_price = data.gas_price.map(|wei| to_gwei(U256::from(wei)).to_string());
				info!(price = ?data.price, gas_price_gwei = ?gas_price, "Chain data updated");
			}
			SyncEvent::Tick { at } => debug!(%at, "Tick"),
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"logging"
	}
}
