//! Network metadata and classification.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ServiceError;

/// Chain ids used by local development nodes (Geth dev mode, Hardhat, Anvil).
const DEVNET_CHAIN_IDS: [u64; 2] = [1337, 31337];

const BUILTIN_CHAINS: &str = include_str!("../../data/chains.json");

/// Kind of network, which decides how transaction history is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetType {
	/// The public network for serious applications
	Mainnet,
	/// Public test networks (Sepolia, Holesky, ...)
	Testnet,
	/// Local single-operator networks without an indexer
	Devnet,
	Unknown,
}

impl fmt::Display for NetType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			NetType::Mainnet => "mainnet",
			NetType::Testnet => "testnet",
			NetType::Devnet => "devnet",
			NetType::Unknown => "unknown",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
	pub name: String,
	pub title: String,
	pub chain_id: u64,
}

impl Network {
	/// Placeholder for chain ids missing from the registry.
	pub fn unknown(chain_id: u64) -> Self {
		Self {
			name: "Unknown".to_string(),
			title: "Unknown".to_string(),
			chain_id,
		}
	}

	pub fn net_type(&self) -> NetType {
		if self.name == "Ethereum Mainnet" {
			NetType::Mainnet
		} else if self.title.contains("Testnet") {
			NetType::Testnet
		} else if DEVNET_CHAIN_IDS.contains(&self.chain_id) {
			NetType::Devnet
		} else {
			NetType::Unknown
		}
	}
}

/// Known networks keyed by chain id.
///
/// Built once at startup and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
	networks: HashMap<u64, Network>,
}

impl ChainRegistry {
	/// Registry of the networks shipped with the crate.
	pub fn builtin() -> Result<Self, ServiceError> {
		Self::from_json(BUILTIN_CHAINS)
	}

	/// Parse a JSON array of `{name, title, chainId}` objects.
	pub fn from_json(json: &str) -> Result<Self, ServiceError> {
		let networks: Vec<Network> =
			serde_json::from_str(json).map_err(|e| ServiceError::Registry(e.to_string()))?;
		debug!(count = networks.len(), "Loaded chain registry");

		Ok(Self {
			networks: networks
				.into_iter()
				.map(|network| (network.chain_id, network))
				.collect(),
		})
	}

	pub fn lookup(&self, chain_id: u64) -> Network {
		self.networks
			.get(&chain_id)
			.cloned()
			.unwrap_or_else(|| Network::unknown(chain_id))
	}

	pub fn len(&self) -> usize {
		self.networks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.networks.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn network(name: &str, title: &str, chain_id: u64) -> Network {
		Network {
			name: name.to_string(),
			title: title.to_string(),
			chain_id,
		}
	}

	#[test]
	fn test_net_type_classification() {
		assert_eq!(
			network("Ethereum Mainnet", "Ethereum Mainnet", 1).net_type(),
			NetType::Mainnet
		);
		assert_eq!(
			network("Sepolia", "Ethereum Testnet Sepolia", 11155111).net_type(),
			NetType::Testnet
		);
		assert_eq!(network("Hardhat", "Local Hardhat Network", 31337).net_type(), NetType::Devnet);
		assert_eq!(network("Geth", "Local", 1337).net_type(), NetType::Devnet);
		assert_eq!(network("Polygon", "Polygon Mainnet", 137).net_type(), NetType::Unknown);
	}

	#[test]
	fn test_net_type_rule_order() {
		// the name rule wins over the title and chain id rules
		assert_eq!(
			network("Ethereum Mainnet", "Testnet", 31337).net_type(),
			NetType::Mainnet
		);
		// the title rule wins over the chain id rule
		assert_eq!(network("Dev", "Local Testnet", 1337).net_type(), NetType::Testnet);
	}

	#[test]
	fn test_builtin_registry() {
		let registry = ChainRegistry::builtin().unwrap();
		assert!(!registry.is_empty());

		assert_eq!(registry.lookup(1).net_type(), NetType::Mainnet);
		assert_eq!(registry.lookup(11155111).net_type(), NetType::Testnet);
		assert_eq!(registry.lookup(31337).net_type(), NetType::Devnet);
		assert_eq!(registry.lookup(1337).net_type(), NetType::Devnet);

		let unknown = registry.lookup(424242);
		assert_eq!(unknown, Network::unknown(424242));
		assert_eq!(unknown.net_type(), NetType::Unknown);
	}

	#[test]
	fn test_malformed_registry_fails_fast() {
		let err = ChainRegistry::from_json(r#"[{"name": "x"}]"#).unwrap_err();
		assert!(matches!(err, ServiceError::Registry(_)));
	}
}
