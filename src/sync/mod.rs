//! Chain synchronization.
//!
//! The [`Syncer`] follows the chain head and periodically refreshes chain wide
//! data, publishing what it learns on an [`EventBus`]:
//!
//! - `events`: topics, event payloads, the broadcast bus and handler trait.
//! - `progress_tracker`: counts observed heads and detects skipped blocks.
//! - `syncer`: the event loop itself.
//!
//! Consumers never call into the synchronizer; they subscribe to topics or
//! register a [`SyncEventHandler`].

/// Event system for decoupled consumers of chain updates
pub mod events;
/// Tracks observed heads and statistics
pub mod progress_tracker;
/// Head following event loop
pub mod syncer;

use crate::provider::{ErrorKind, ProviderError};

pub use events::*;
pub use progress_tracker::{SyncProgressTracker, SyncStats};
pub use syncer::Syncer;

/// Error types for the synchronizer
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Synchronizer already started")]
	AlreadyStarted,

	#[error(transparent)]
	Provider(#[from] ProviderError),

	#[error("Event handler error: {0}")]
	Handler(String),
}

impl SyncError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			SyncError::AlreadyStarted => ErrorKind::Rejected,
			SyncError::Provider(e) => e.kind(),
			SyncError::Handler(_) => ErrorKind::InvalidInput,
		}
	}
}
