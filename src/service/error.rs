use alloy::primitives::Address;

use crate::explorer::ExplorerError;
use crate::provider::{ErrorKind, ProviderError};
use crate::utils::ConvError;

/// Error types for account, contract and history resolution
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error(transparent)]
	Provider(#[from] ProviderError),

	#[error("Explorer error: {0}")]
	Explorer(#[from] ExplorerError),

	#[error("Address {0} is not a contract account")]
	NotAContract(Address),

	#[error("Invalid address {input:?}: {reason}")]
	InvalidAddress { input: String, reason: String },

	#[error("Invalid private key: {0}")]
	InvalidKey(String),

	#[error("Invalid ABI: {0}")]
	InvalidAbi(String),

	#[error("Contract {0} has no ABI")]
	MissingAbi(Address),

	#[error("Method {0} is not found in contract")]
	MethodNotFound(String),

	#[error("Method {0} is not a constant method")]
	NotConstant(String),

	#[error("Invalid arguments for {method}: {reason}")]
	InvalidArguments { method: String, reason: String },

	#[error("Cannot decode result of {method}: {reason}")]
	Decode { method: String, reason: String },

	#[error(transparent)]
	Conversion(#[from] ConvError),

	#[error("Cannot load chain registry: {0}")]
	Registry(String),
}

impl ServiceError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ServiceError::Provider(e) => e.kind(),
			ServiceError::Explorer(e) => e.kind(),
			ServiceError::NotAContract(_) => ErrorKind::NotAContract,
			ServiceError::Decode { .. } | ServiceError::Registry(_) => ErrorKind::Malformed,
			ServiceError::InvalidAddress { .. }
			| ServiceError::InvalidKey(_)
			| ServiceError::InvalidAbi(_)
			| ServiceError::MissingAbi(_)
			| ServiceError::MethodNotFound(_)
			| ServiceError::NotConstant(_)
			| ServiceError::InvalidArguments { .. }
			| ServiceError::Conversion(_) => ErrorKind::InvalidInput,
		}
	}
}
