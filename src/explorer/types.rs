//! Etherscan response payloads.
//!
//! Etherscan wraps every answer in a `{status, message, result}` envelope and
//! encodes every number as a decimal string. The raw shapes are kept private;
//! callers only see [`IndexedTransaction`], [`VerifiedSource`] and prices.

use std::str::FromStr;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, B256, Bytes, U256};
use serde::Deserialize;
use tracing::warn;

use crate::provider::ErrorKind;
use crate::types::IndexedTransaction;
use crate::utils::hex_to_bytes;

/// Error types for explorer operations
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("HTTP status {status}: {body}")]
	StatusError { status: u16, body: String },

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Malformed {field}: {value:?}")]
	Malformed { field: &'static str, value: String },
}

impl ExplorerError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ExplorerError::HttpError(e) if e.is_timeout() => ErrorKind::Timeout,
			ExplorerError::HttpError(_) => ErrorKind::Transport,
			ExplorerError::StatusError { status, .. } if *status >= 500 || *status == 429 => {
				ErrorKind::Transport
			}
			ExplorerError::StatusError { .. } => ErrorKind::Rejected,
			ExplorerError::JsonError(_) | ExplorerError::Malformed { .. } => ErrorKind::Malformed,
		}
	}
}

/// Verified contract source as published on the explorer.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSource {
	pub contract_name: String,
	pub source: String,
	pub abi: JsonAbi,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
	status: String,
	#[serde(default)]
	message: String,
	result: serde_json::Value,
}

/// Unwrap the response envelope and return its `result`.
///
/// A `status` of `"0"` is only logged: Etherscan also uses it for empty
/// results, and a real error surfaces when `result` fails to decode.
pub(crate) fn open_envelope(body: &str) -> Result<serde_json::Value, ExplorerError> {
	let envelope: ResponseEnvelope = serde_json::from_str(body)?;
	if envelope.status == "0" {
		warn!(
			message = %envelope.message,
			result = %envelope.result,
			"Etherscan API status is not OK"
		);
	}
	Ok(envelope.result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
	block_number: String,
	time_stamp: String,
	hash: String,
	nonce: String,
	block_hash: String,
	transaction_index: String,
	from: String,
	#[serde(default)]
	to: String,
	value: String,
	gas: String,
	gas_price: String,
	#[serde(default)]
	is_error: String,
	#[serde(default)]
	input: String,
}

fn field<T: FromStr>(field: &'static str, value: &str) -> Result<T, ExplorerError> {
	value.parse().map_err(|_| ExplorerError::Malformed {
		field,
		value: value.to_string(),
	})
}

fn decimal(field: &'static str, value: &str) -> Result<U256, ExplorerError> {
	U256::from_str_radix(value, 10).map_err(|_| ExplorerError::Malformed {
		field,
		value: value.to_string(),
	})
}

impl TryFrom<RawTransaction> for IndexedTransaction {
	type Error = ExplorerError;

	fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
		let to = if raw.to.is_empty() {
			None
		} else {
			Some(field::<Address>("to", &raw.to)?)
		};
		let input = hex_to_bytes(&raw.input).map_err(|_| ExplorerError::Malformed {
			field: "input",
			value: raw.input.clone(),
		})?;

		Ok(IndexedTransaction {
			block_number: field("blockNumber", &raw.block_number)?,
			timestamp: field("timeStamp", &raw.time_stamp)?,
			hash: field::<B256>("hash", &raw.hash)?,
			nonce: field("nonce", &raw.nonce)?,
			block_hash: field::<B256>("blockHash", &raw.block_hash)?,
			transaction_index: field("transactionIndex", &raw.transaction_index)?,
			from: field::<Address>("from", &raw.from)?,
			to,
			value: decimal("value", &raw.value)?,
			gas: field("gas", &raw.gas)?,
			gas_price: decimal("gasPrice", &raw.gas_price)?,
			input: Bytes::from(input),
			is_error: raw.is_error == "1",
		})
	}
}

pub(crate) fn parse_transactions(
	result: serde_json::Value,
) -> Result<Vec<IndexedTransaction>, ExplorerError> {
	let rows: Vec<RawTransaction> = serde_json::from_value(result)?;
	rows.into_iter().map(IndexedTransaction::try_from).collect()
}

#[derive(Debug, Deserialize)]
struct RawSourceCode {
	#[serde(rename = "SourceCode", default)]
	source_code: String,
	#[serde(rename = "ABI", default)]
	abi: String,
	#[serde(rename = "ContractName", default)]
	contract_name: String,
}

pub(crate) fn parse_source_code(
	result: serde_json::Value,
) -> Result<Option<VerifiedSource>, ExplorerError> {
	let entries: Vec<RawSourceCode> = serde_json::from_value(result)?;
	let Some(entry) = entries.into_iter().next() else {
		return Ok(None);
	};

	// unverified contracts come back with an empty source
	if entry.source_code.is_empty() {
		return Ok(None);
	}

	let abi: JsonAbi = serde_json::from_str(&entry.abi)?;
	Ok(Some(VerifiedSource {
		contract_name: entry.contract_name,
		source: entry.source_code,
		abi,
	}))
}

#[derive(Debug, Deserialize)]
struct RawEthPrice {
	ethusd: String,
}

pub(crate) fn parse_eth_price(result: serde_json::Value) -> Result<f64, ExplorerError> {
	let price: RawEthPrice = serde_json::from_value(result)?;
	field("ethusd", &price.ethusd)
}

#[cfg(test)]
mod tests {
	use super::*;

	const TXLIST: &str = r#"{
		"status": "1",
		"message": "OK",
		"result": [
			{
				"blockNumber": "14923678",
				"timeStamp": "1654646411",
				"hash": "0xc52783ad354aecc04c670047754f062e3d6d04e8f5b24774472651f9c3882c60",
				"nonce": "1",
				"blockHash": "0x7e1638fd2c6bdd05ffd83c1cf06c63e2f67d0f802084bef076d06bdcf86d1bb0",
				"transactionIndex": "61",
				"from": "0x9aa99c23f67c81701c772b106b4f83f6e858dd2e",
				"to": "",
				"value": "0",
				"gas": "6000000",
				"gasPrice": "83924748773",
				"isError": "0",
				"txreceipt_status": "1",
				"input": "0x6080"
			},
			{
				"blockNumber": "14923692",
				"timeStamp": "1654646570",
				"hash": "0x8a1a9989bda84f80143181a68bc137ecefa64d0d4ebde45dd94fc0cf49e70cb6",
				"nonce": "0",
				"blockHash": "0x0c7e2b8b4d7b3bd3d1e3a6d0e57c6b2c5a7d8f8a5b9b1f2b2d8c1c0d3e6f7a8b",
				"transactionIndex": "122",
				"from": "0x1111111111111111111111111111111111111111",
				"to": "0x9aa99c23f67c81701c772b106b4f83f6e858dd2e",
				"value": "1000000000000000000",
				"gas": "21000",
				"gasPrice": "80000000000",
				"isError": "1",
				"txreceipt_status": "0",
				"input": "0x"
			}
		]
	}"#;

	#[test]
	fn test_parse_transactions() {
		let result = open_envelope(TXLIST).unwrap();
		let txs = parse_transactions(result).unwrap();

		assert_eq!(txs.len(), 2);

		let creation = &txs[0];
		assert_eq!(creation.block_number, 14923678);
		assert_eq!(creation.timestamp, 1654646411);
		assert_eq!(creation.to, None);
		assert_eq!(creation.input, Bytes::from(vec![0x60, 0x80]));
		assert!(!creation.is_error);

		let transfer = &txs[1];
		assert_eq!(
			transfer.to,
			Some("0x9aa99c23f67c81701c772b106b4f83f6e858dd2e".parse().unwrap())
		);
		assert_eq!(transfer.value, U256::from(1_000_000_000_000_000_000u128));
		assert!(transfer.input.is_empty());
		assert!(transfer.is_error);
	}

	#[test]
	fn test_error_result_is_malformed() {
		let body = r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#;
		let result = open_envelope(body).unwrap();

		let err = parse_transactions(result).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Malformed);
	}

	#[test]
	fn test_empty_result_is_not_an_error() {
		let body = r#"{"status":"0","message":"No transactions found","result":[]}"#;
		let txs = parse_transactions(open_envelope(body).unwrap()).unwrap();
		assert!(txs.is_empty());
	}

	#[test]
	fn test_bad_number_is_malformed() {
		let body = TXLIST.replace("\"14923678\"", "\"fourteen\"");
		let err = parse_transactions(open_envelope(&body).unwrap()).unwrap_err();
		assert!(matches!(
			err,
			ExplorerError::Malformed {
				field: "blockNumber",
				..
			}
		));
	}

	#[test]
	fn test_parse_source_code() {
		let abi = r#"[{"type":"function","name":"balanceOf","stateMutability":"view","inputs":[{"name":"who","type":"address"}],"outputs":[{"name":"","type":"uint256"}]}]"#;
		let result = serde_json::json!([{
			"SourceCode": "contract Token {}",
			"ABI": abi,
			"ContractName": "Token"
		}]);

		let source = parse_source_code(result).unwrap().unwrap();
		assert_eq!(source.contract_name, "Token");
		assert!(source.abi.function("balanceOf").is_some());
	}

	#[test]
	fn test_unverified_source_is_none() {
		let result = serde_json::json!([{
			"SourceCode": "",
			"ABI": "Contract source code not verified",
			"ContractName": ""
		}]);

		assert!(parse_source_code(result).unwrap().is_none());
	}

	#[test]
	fn test_parse_eth_price() {
		let result = serde_json::json!({
			"ethbtc": "0.05",
			"ethbtc_timestamp": "1654646411",
			"ethusd": "1812.34",
			"ethusd_timestamp": "1654646411"
		});

		assert_eq!(parse_eth_price(result).unwrap(), 1812.34);
	}
}
