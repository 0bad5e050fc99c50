use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::U256;
use alloy::primitives::utils::{format_ether, parse_ether};

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Errors raised while converting operator supplied values
#[derive(Debug, thiserror::Error)]
pub enum ConvError {
	#[error("Invalid hex string: {0}")]
	Hex(#[from] hex::FromHexError),

	#[error("Invalid integer {input:?}: {reason}")]
	Integer { input: String, reason: String },

	#[error("Invalid ether amount {input:?}: {reason}")]
	Amount { input: String, reason: String },

	#[error("Cannot parse {input:?} as {ty}: {reason}")]
	Argument {
		input: String,
		ty: String,
		reason: String,
	},
}

/// Format an amount in wei as a decimal ether string.
pub fn to_ether(wei: U256) -> String {
	format_ether(wei)
}

/// Convert wei to whole gwei, truncating.
pub fn to_gwei(wei: U256) -> U256 {
	wei / U256::from(WEI_PER_GWEI)
}

/// Parse a decimal ether amount such as `"1.5"` into wei.
pub fn from_ether(amount: &str) -> Result<U256, ConvError> {
	parse_ether(amount.trim()).map_err(|e| ConvError::Amount {
		input: amount.to_string(),
		reason: e.to_string(),
	})
}

/// Strip a leading `0x`/`0X` if present.
pub fn trim_0x(s: &str) -> &str {
	s.strip_prefix("0x")
		.or_else(|| s.strip_prefix("0X"))
		.unwrap_or(s)
}

pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, ConvError> {
	Ok(hex::decode(trim_0x(s))?)
}

pub fn hex_to_u64(s: &str) -> Result<u64, ConvError> {
	u64::from_str_radix(trim_0x(s), 16).map_err(|e| ConvError::Integer {
		input: s.to_string(),
		reason: e.to_string(),
	})
}

/// Coerce an operator typed argument into a value of the ABI type `ty`
/// (for example `uint256`, `address` or `bool`).
pub fn parse_argument(ty: &str, input: &str) -> Result<DynSolValue, ConvError> {
	let argument_error = |reason: String| ConvError::Argument {
		input: input.to_string(),
		ty: ty.to_string(),
		reason,
	};

	let sol_type = DynSolType::parse(ty).map_err(|e| argument_error(e.to_string()))?;
	sol_type
		.coerce_str(input.trim())
		.map_err(|e| argument_error(e.to_string()))
}
