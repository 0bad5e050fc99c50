use std::fmt;
use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi, StateMutability};
use alloy::primitives::{Address, Bytes};
use parking_lot::RwLock;
use tracing::debug;

use super::{Account, ServiceError};
use crate::explorer::VerifiedSource;
use crate::utils::parse_argument;

/// A contract account, optionally with its ABI and verified source.
pub struct Contract {
	account: Arc<Account>,
	/// Can be replaced later through [`Contract::import_abi`]
	abi: RwLock<Option<Arc<JsonAbi>>>,
	name: Option<String>,
	source: Option<String>,
}

impl Contract {
	/// Contract without ABI or source.
	pub(crate) fn skeleton(account: Arc<Account>) -> Self {
		Self {
			account,
			abi: RwLock::new(None),
			name: None,
			source: None,
		}
	}

	pub(crate) fn verified(account: Arc<Account>, verified: VerifiedSource) -> Self {
		Self {
			account,
			abi: RwLock::new(Some(Arc::new(verified.abi))),
			name: Some(verified.contract_name),
			source: Some(verified.source),
		}
	}

	pub fn account(&self) -> &Arc<Account> {
		&self.account
	}

	pub fn address(&self) -> Address {
		self.account.address()
	}

	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	pub fn source(&self) -> Option<&str> {
		self.source.as_deref()
	}

	pub fn abi(&self) -> Option<Arc<JsonAbi>> {
		self.abi.read().clone()
	}

	pub fn has_abi(&self) -> bool {
		self.abi.read().is_some()
	}

	/// Replace the ABI with one parsed from its JSON representation.
	pub fn import_abi(&self, json: &str) -> Result<(), ServiceError> {
		debug!(address = %self.address(), "Importing ABI");
		let abi: JsonAbi =
			serde_json::from_str(json).map_err(|e| ServiceError::InvalidAbi(e.to_string()))?;
		*self.abi.write() = Some(Arc::new(abi));
		Ok(())
	}

	/// Find `method` and ABI-encode a call to it from operator supplied
	/// arguments.
	pub(crate) fn encode_call(
		&self,
		method: &str,
		args: &[String],
	) -> Result<(Function, Bytes), ServiceError> {
		let abi = self.abi().ok_or(ServiceError::MissingAbi(self.address()))?;
		let overloads = abi
			.function(method)
			.ok_or_else(|| ServiceError::MethodNotFound(method.to_string()))?;
		let function = overloads
			.iter()
			.find(|f| f.inputs.len() == args.len())
			.ok_or_else(|| ServiceError::InvalidArguments {
				method: method.to_string(),
				reason: format!("no overload takes {} arguments", args.len()),
			})?;

		let values = function
			.inputs
			.iter()
			.zip(args)
			.map(|(param, arg)| parse_argument(&param.selector_type(), arg))
			.collect::<Result<Vec<_>, _>>()?;

		let input = function
			.abi_encode_input(&values)
			.map_err(|e| ServiceError::InvalidArguments {
				method: method.to_string(),
				reason: e.to_string(),
			})?;

		Ok((function.clone(), Bytes::from(input)))
	}

	/// Call a `view` or `pure` method against the latest state and decode its
	/// outputs.
	pub async fn call(&self, method: &str, args: &[String]) -> Result<Vec<DynSolValue>, ServiceError> {
		let (function, input) = self.encode_call(method, args)?;
		if !matches!(
			function.state_mutability,
			StateMutability::View | StateMutability::Pure
		) {
			return Err(ServiceError::NotConstant(method.to_string()));
		}

		debug!(address = %self.address(), method, ?args, "Calling contract");
		let output = self.account.client().call(self.address(), input).await?;

		function
			.abi_decode_output(&output)
			.map_err(|e| ServiceError::Decode {
				method: method.to_string(),
				reason: e.to_string(),
			})
	}
}

impl fmt::Debug for Contract {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Contract")
			.field("address", &self.address())
			.field("name", &self.name)
			.field("has_abi", &self.has_abi())
			.finish()
	}
}
