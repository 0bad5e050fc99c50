//! HTTP client for the Etherscan API.
//!
//! All endpoints are plain `GET` requests against a single URL, selected by
//! `module`/`action` query parameters. Responses are unwrapped from the
//! Etherscan envelope and decoded into domain types.

use std::fmt;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use super::Explorer;
use super::types::*;
use crate::types::IndexedTransaction;

/// Etherscan API client
#[derive(Clone)]
pub struct EtherscanClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL, e.g. `https://api.etherscan.io/api`.
	endpoint: String,
	api_key: String,
}

impl EtherscanClient {
	/// Create a new Etherscan client.
	///
	/// # Arguments
	/// * `endpoint` - The API URL of the network's Etherscan instance.
	/// * `api_key` - The Etherscan API key.
	/// * `timeout` - Deadline applied to every request.
	pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, ExplorerError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			endpoint,
			api_key,
		})
	}

	/// Execute a query and return the `result` field of the response.
	async fn execute_query(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, ExplorerError> {
		debug!(?params, "Querying Etherscan");

		let response = self
			.http_client
			.get(&self.endpoint)
			.query(&[("apikey", self.api_key.as_str())])
			.query(params)
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await?;
		if !status.is_success() {
			error!(%status, %body, "HTTP status code is not OK");
			return Err(ExplorerError::StatusError {
				status: status.as_u16(),
				body,
			});
		}

		open_envelope(&body)
	}
}

impl fmt::Debug for EtherscanClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EtherscanClient")
			.field("endpoint", &self.endpoint)
			.finish_non_exhaustive()
	}
}

#[async_trait]
impl Explorer for EtherscanClient {
	async fn account_transactions(
		&self,
		address: Address,
	) -> Result<Vec<IndexedTransaction>, ExplorerError> {
		let address = address.to_string();
		let result = self
			.execute_query(&[
				("module", "account"),
				("action", "txlist"),
				("address", &address),
				("startblock", "0"),
				("endblock", "99999999"),
				("sort", "desc"),
				("page", "1"),
				("offset", "100"),
			])
			.await?;

		let transactions = parse_transactions(result)?;
		debug!(%address, count = transactions.len(), "Fetched account transactions");
		Ok(transactions)
	}

	async fn source_code(&self, address: Address) -> Result<Option<VerifiedSource>, ExplorerError> {
		let address = address.to_string();
		let result = self
			.execute_query(&[
				("module", "contract"),
				("action", "getsourcecode"),
				("address", &address),
			])
			.await?;

		parse_source_code(result)
	}

	async fn eth_price(&self) -> Result<f64, ExplorerError> {
		let result = self
			.execute_query(&[("module", "stats"), ("action", "ethprice")])
			.await?;

		parse_eth_price(result)
	}
}
