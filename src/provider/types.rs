//! Types shared by the node client: errors, chain identity, batch results and
//! the Alchemy asset-transfer extension.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::transports::{RpcError, TransportError};
use serde::{Deserialize, Serialize};

use super::signer::ChainSigner;

/// Coarse classification of every failure surfaced by this crate.
///
/// Callers branch on the kind rather than on concrete error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Connection-level failure; the request may succeed if retried.
	Transport,
	/// The request did not complete within its deadline.
	Timeout,
	/// A response could not be decoded. Indicates a protocol mismatch.
	Malformed,
	/// The requested entity does not exist.
	NotFound,
	/// The address holds no byte code.
	NotAContract,
	/// The operation is not available on the active provider.
	Unsupported,
	/// The node or explorer understood the request and refused it.
	Rejected,
	/// The caller supplied invalid input (key, address, argument, ABI).
	InvalidInput,
}

impl ErrorKind {
	/// Whether retrying the same request can reasonably succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, ErrorKind::Transport | ErrorKind::Timeout)
	}
}

/// Error types for node client operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
	#[error("Node unavailable: {0}")]
	Transport(String),

	#[error("Request {operation} timed out after {after:?}")]
	Timeout {
		operation: &'static str,
		after: Duration,
	},

	#[error("Malformed response: {0}")]
	Malformed(String),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Node rejected request ({code}): {message}")]
	Rejected { code: i64, message: String },

	#[error("Unsupported by provider: {0}")]
	Unsupported(String),

	#[error("Invalid chain id for signer: expected {expected}, got {actual}")]
	InvalidChainId { expected: u64, actual: u64 },

	#[error("Signing error: {0}")]
	Signing(String),
}

impl ProviderError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ProviderError::Transport(_) => ErrorKind::Transport,
			ProviderError::Timeout { .. } => ErrorKind::Timeout,
			ProviderError::Malformed(_) => ErrorKind::Malformed,
			ProviderError::NotFound(_) => ErrorKind::NotFound,
			ProviderError::Rejected { .. } => ErrorKind::Rejected,
			ProviderError::Unsupported(_) => ErrorKind::Unsupported,
			ProviderError::InvalidChainId { .. } => ErrorKind::Malformed,
			ProviderError::Signing(_) => ErrorKind::InvalidInput,
		}
	}
}

impl From<TransportError> for ProviderError {
	fn from(err: TransportError) -> Self {
		match err {
			RpcError::ErrorResp(payload) => ProviderError::Rejected {
				code: payload.code,
				message: payload.message.to_string(),
			},
			RpcError::NullResp => ProviderError::NotFound("null response".to_string()),
			RpcError::UnsupportedFeature(feature) => ProviderError::Unsupported(feature.to_string()),
			RpcError::SerError(e) => ProviderError::Malformed(e.to_string()),
			RpcError::DeserError { err, text } => {
				ProviderError::Malformed(format!("{err} (response: {text})"))
			}
			other => ProviderError::Transport(other.to_string()),
		}
	}
}

/// One slot of a batched read.
///
/// A batch either fails as a whole (the round-trip failed) or yields one
/// result per requested item, in request order.
pub type BatchItem<T> = Result<T, ProviderError>;

/// Chain id of the connected node together with the signer bound to it.
#[derive(Clone)]
pub struct ChainIdentity {
	pub chain_id: u64,
	pub signer: Arc<dyn ChainSigner>,
}

impl fmt::Debug for ChainIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChainIdentity")
			.field("chain_id", &self.chain_id)
			.finish_non_exhaustive()
	}
}

/// Vendor behind the JSON-RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
	/// A local node such as Geth, Hardhat or Anvil
	Local,
	/// Alchemy (https://www.alchemy.com/)
	#[default]
	Alchemy,
}

impl fmt::Display for ProviderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProviderKind::Local => f.write_str("local"),
			ProviderKind::Alchemy => f.write_str("alchemy"),
		}
	}
}

impl FromStr for ProviderKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"local" => Ok(ProviderKind::Local),
			"alchemy" => Ok(ProviderKind::Alchemy),
			other => Err(format!("unknown provider {other:?}, expected 'local' or 'alchemy'")),
		}
	}
}

/// Parameters of `alchemy_getAssetTransfers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfersParams {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub from_block: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub to_block: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub from_address: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub to_address: Option<String>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub contract_addresses: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub category: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub order: Option<String>,
	#[serde(skip_serializing_if = "std::ops::Not::not", default)]
	pub with_metadata: bool,
	#[serde(skip_serializing_if = "std::ops::Not::not", default)]
	pub exclude_zero_value: bool,
	/// Hex encoded, e.g. `0x14` for 20.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_count: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub page_key: Option<String>,
}

/// Result of `alchemy_getAssetTransfers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfersResult {
	#[serde(default)]
	pub page_key: Option<String>,
	#[serde(default)]
	pub transfers: Vec<AssetTransfer>,
}

/// A single transfer reported by Alchemy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
	pub category: String,
	pub block_num: String,
	pub from: String,
	#[serde(default)]
	pub to: Option<String>,
	#[serde(default)]
	pub value: Option<f64>,
	#[serde(default)]
	pub asset: Option<String>,
	#[serde(default)]
	pub unique_id: Option<String>,
	pub hash: String,
}
