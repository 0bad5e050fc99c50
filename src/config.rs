//! Runtime configuration.
//!
//! [`Config`] only carries plain values: which provider and network to talk
//! to, API keys and the tuning knobs of the resolver and synchronizer. Loading
//! it from files or flags is left to the embedding application; the binary
//! reads it from `RAMEN_*` environment variables.

use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

/// Where transaction history comes from on networks with an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
	/// Etherscan `account/txlist`
	#[default]
	Etherscan,
	/// Alchemy `alchemy_getAssetTransfers`
	Alchemy,
}

/// Errors raised while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Invalid value for {var}: {reason}")]
	InvalidValue { var: &'static str, reason: String },
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Vendor of the JSON-RPC endpoint
	pub provider: ProviderKind,
	/// Network name as used in provider URLs, e.g. `mainnet` or `sepolia`
	pub network: String,
	/// Explicit node URL, takes precedence over the derived one
	pub endpoint: Option<String>,
	#[serde(skip_serializing)]
	pub api_key: String,
	#[serde(skip_serializing)]
	pub etherscan_api_key: String,
	pub request_timeout_secs: u64,
	/// Interval between two chain data refreshes
	pub update_period_secs: u64,
	/// How long a resolved contract stays cached
	pub contract_ttl_secs: u64,
	/// Maximum number of blocks scanned for history on local networks
	pub history_scan_depth: u64,
	/// Number of blocks fetched per batch while scanning
	pub history_batch_size: usize,
	/// Maximum number of transactions a history query returns
	pub history_limit: usize,
	pub history_source: HistorySource,
	/// Events buffered per subscriber before the slowest one starts missing events
	pub event_bus_capacity: usize,
	pub debug: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			provider: ProviderKind::Alchemy,
			network: "mainnet".to_string(),
			endpoint: None,
			api_key: String::new(),
			etherscan_api_key: String::new(),
			request_timeout_secs: 30,
			update_period_secs: 10,
			contract_ttl_secs: 600,
			history_scan_depth: 100,
			history_batch_size: 20,
			history_limit: 100,
			history_source: HistorySource::Etherscan,
			event_bus_capacity: 256,
			debug: false,
		}
	}
}

impl Config {
	/// Build a configuration from `RAMEN_*` environment variables on top of the
	/// defaults.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let mut config = Config::default();

		if let Some(provider) = lookup("RAMEN_PROVIDER") {
			config.provider = provider
				.parse()
				.map_err(|reason| ConfigError::InvalidValue {
					var: "RAMEN_PROVIDER",
					reason,
				})?;
		}
		if let Some(network) = lookup("RAMEN_NETWORK") {
			config.network = network.to_lowercase();
		}
		if let Some(api_key) = lookup("RAMEN_API_KEY") {
			config.api_key = api_key;
		}
		if let Some(api_key) = lookup("RAMEN_ETHERSCAN_API_KEY") {
			config.etherscan_api_key = api_key;
		}
		config.endpoint = lookup("RAMEN_ENDPOINT").filter(|url| !url.is_empty());
		config.debug = lookup("RAMEN_DEBUG").is_some_and(|v| !v.is_empty() && v != "0");

		Ok(config)
	}

	/// Node URL for the configured provider and network.
	pub fn endpoint(&self) -> String {
		if let Some(endpoint) = &self.endpoint {
			return endpoint.clone();
		}

		match self.provider {
			ProviderKind::Local => "ws://localhost:8545".to_string(),
			ProviderKind::Alchemy => format!(
				"wss://eth-{}.alchemyapi.io/v2/{}",
				self.network.to_lowercase(),
				self.api_key
			),
		}
	}

	/// Etherscan API URL for the configured network.
	pub fn etherscan_endpoint(&self) -> String {
		if self.network.eq_ignore_ascii_case("mainnet") {
			"https://api.etherscan.io/api".to_string()
		} else {
			format!("https://api-{}.etherscan.io/api", self.network.to_lowercase())
		}
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn update_period(&self) -> Duration {
		Duration::from_secs(self.update_period_secs)
	}

	pub fn contract_ttl(&self) -> Duration {
		Duration::from_secs(self.contract_ttl_secs)
	}
}

fn redact(secret: &str) -> &'static str {
	if secret.is_empty() { "" } else { "<redacted>" }
}

impl fmt::Debug for Config {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Config")
			.field("provider", &self.provider)
			.field("network", &self.network)
			.field("endpoint", &self.endpoint.as_ref().map(|_| "<custom>"))
			.field("api_key", &redact(&self.api_key))
			.field("etherscan_api_key", &redact(&self.etherscan_api_key))
			.field("request_timeout_secs", &self.request_timeout_secs)
			.field("update_period_secs", &self.update_period_secs)
			.field("contract_ttl_secs", &self.contract_ttl_secs)
			.field("history_scan_depth", &self.history_scan_depth)
			.field("history_batch_size", &self.history_batch_size)
			.field("history_limit", &self.history_limit)
			.field("history_source", &self.history_source)
			.field("event_bus_capacity", &self.event_bus_capacity)
			.field("debug", &self.debug)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_defaults() {
		let config = Config::default();
		assert_eq!(config.provider, ProviderKind::Alchemy);
		assert_eq!(config.network, "mainnet");
		assert_eq!(config.request_timeout(), Duration::from_secs(30));
		assert_eq!(config.update_period(), Duration::from_secs(10));
		assert_eq!(config.contract_ttl(), Duration::from_secs(600));
		assert_eq!(config.history_source, HistorySource::Etherscan);
	}

	#[test]
	fn test_serialized_config_omits_keys() {
		let config = Config {
			api_key: "node-secret".to_string(),
			etherscan_api_key: "explorer-secret".to_string(),
			..Default::default()
		};

		let value = serde_json::to_value(&config).unwrap();
		assert!(value.get("api_key").is_none());
		assert!(value.get("etherscan_api_key").is_none());
		assert_eq!(value["network"], "mainnet");
		assert!(!value.to_string().contains("secret"));

		// keys are still read from input
		let parsed: Config =
			serde_json::from_str(r#"{"api_key":"node-secret","network":"sepolia"}"#).unwrap();
		assert_eq!(parsed.api_key, "node-secret");
		assert_eq!(parsed.network, "sepolia");
	}

	#[test]
	fn test_endpoints() {
		let mut config = Config {
			api_key: "KEY".to_string(),
			..Default::default()
		};
		assert_eq!(config.endpoint(), "wss://eth-mainnet.alchemyapi.io/v2/KEY");
		assert_eq!(config.etherscan_endpoint(), "https://api.etherscan.io/api");

		config.network = "Sepolia".to_string();
		assert_eq!(config.endpoint(), "wss://eth-sepolia.alchemyapi.io/v2/KEY");
		assert_eq!(config.etherscan_endpoint(), "https://api-sepolia.etherscan.io/api");

		config.provider = ProviderKind::Local;
		assert_eq!(config.endpoint(), "ws://localhost:8545");

		config.endpoint = Some("http://127.0.0.1:8545".to_string());
		assert_eq!(config.endpoint(), "http://127.0.0.1:8545");
	}

	#[test]
	fn test_from_lookup() {
		let config = Config::from_lookup(lookup(&[
			("RAMEN_PROVIDER", "local"),
			("RAMEN_NETWORK", "Holesky"),
			("RAMEN_ETHERSCAN_API_KEY", "ES"),
			("RAMEN_DEBUG", "1"),
		]))
		.unwrap();

		assert_eq!(config.provider, ProviderKind::Local);
		assert_eq!(config.network, "holesky");
		assert_eq!(config.etherscan_api_key, "ES");
		assert!(config.debug);
		assert_eq!(config.endpoint, None);
	}

	#[test]
	fn test_from_lookup_rejects_unknown_provider() {
		let err = Config::from_lookup(lookup(&[("RAMEN_PROVIDER", "infura")])).unwrap_err();
		assert!(err.to_string().contains("RAMEN_PROVIDER"));
	}

	#[test]
	fn test_debug_redacts_keys() {
		let config = Config {
			api_key: "supersecret".to_string(),
			..Default::default()
		};
		let rendered = format!("{config:?}");
		assert!(!rendered.contains("supersecret"));
		assert!(rendered.contains("<redacted>"));
	}

	#[test]
	fn test_deserialize_partial() {
		let config: Config =
			serde_json::from_str(r#"{"provider":"local","history_limit":5}"#).unwrap();
		assert_eq!(config.provider, ProviderKind::Local);
		assert_eq!(config.history_limit, 5);
		assert_eq!(config.history_scan_depth, 100);
	}
}
