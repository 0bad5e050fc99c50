//! Progress tracking for chain synchronization.
//!
//! The `SyncProgressTracker` records the heads delivered by the node. A
//! subscription may skip heads (a reconnect, a node under load) or deliver a
//! head at or below one already seen (a reorg); both are counted so the
//! synchronizer can log them, and skipped ranges are kept as gaps.

use std::collections::{BTreeMap, VecDeque};

use alloy::primitives::B256;
use tracing::{info, warn};

/// Log progress every this many blocks
const LOG_INTERVAL: u64 = 100;

/// Number of recent heads remembered for reorg detection
const REORG_WINDOW: u64 = 128;

/// Number of most recent gap ranges kept; older ones are only counted
const MAX_GAPS: usize = 64;

/// Service for tracking synchronization progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
	/// The highest block number we've processed
	highest_block: Option<u64>,
	/// First head of this session
	start_block: Option<u64>,
	/// Hash of each recent head by block number
	recent: BTreeMap<u64, B256>,
	/// Heads received, including repeats
	heads_received: usize,
	/// Heads replacing a known block of the same height
	reorgs: usize,
	/// Latest ranges of block numbers skipped between two heads (inclusive)
	gaps: VecDeque<(u64, u64)>,
	/// Gaps seen since the start, including those no longer kept
	gap_count: usize,
	/// Last block at which we logged progress
	last_logged_block: u64,
}

impl SyncProgressTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a head delivered by the subscription.
	pub fn record_head(&mut self, number: u64, hash: B256) {
		self.heads_received += 1;
		let previous = self.recent.insert(number, hash);

		match self.highest_block {
			None => {
				self.start_block = Some(number);
				self.last_logged_block = number;
				self.highest_block = Some(number);
			}
			Some(highest) if number > highest => {
				if number > highest + 1 {
					warn!(from = highest + 1, to = number - 1, "Skipped blocks between heads");
					if self.gaps.len() == MAX_GAPS {
						self.gaps.pop_front();
					}
					self.gaps.push_back((highest + 1, number - 1));
					self.gap_count += 1;
				}
				self.highest_block = Some(number);
			}
			Some(highest) => {
				if previous.is_some_and(|known| known != hash) {
					warn!(number, highest, %hash, "Chain reorganisation");
					self.reorgs += 1;
				}
			}
		}

		if let Some(highest) = self.highest_block {
			let oldest = highest.saturating_sub(REORG_WINDOW);
			self.recent = self.recent.split_off(&oldest);
		}
	}

	pub fn highest_block(&self) -> Option<u64> {
		self.highest_block
	}

	/// Most recent ranges of block numbers never delivered as heads, oldest
	/// first.
	pub fn gaps(&self) -> Vec<(u64, u64)> {
		self.gaps.iter().copied().collect()
	}

	/// Log progress at regular intervals or when forced
	pub fn log_progress(&mut self, force: bool) {
		let Some(highest) = self.highest_block else {
			return;
		};

		if force || highest.saturating_sub(self.last_logged_block) >= LOG_INTERVAL {
			info!(
				highest,
				heads = self.heads_received,
				reorgs = self.reorgs,
				gaps = self.gap_count,
				"Sync progress"
			);
			self.last_logged_block = highest;
		}
	}

	/// Get sync statistics as a SyncStats struct
	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			start_block: self.start_block,
			highest_block: self.highest_block,
			heads_received: self.heads_received,
			reorgs: self.reorgs,
			gap_count: self.gap_count,
			gaps: self.gaps(),
		}
	}
}

/// Statistics about the sync progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
	pub start_block: Option<u64>,
	pub highest_block: Option<u64>,
	pub heads_received: usize,
	pub reorgs: usize,
	pub gap_count: usize,
	/// Most recent gaps only
	pub gaps: Vec<(u64, u64)>,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		match (self.start_block, self.highest_block) {
			(Some(start), Some(highest)) => format!(
				"Followed blocks {} to {}: {} heads, {} reorgs{}",
				start,
				highest,
				self.heads_received,
				self.reorgs,
				if self.gap_count == 0 {
					String::new()
				} else {
					format!(" ({} gaps)", self.gap_count)
				}
			),
			_ => "No blocks followed".to_string(),
		}
	}
}
