//! Object cache for resolved accounts and contracts.
//!
//! Entries are keyed by chain id and address so that switching networks can
//! never serve another chain's object. Accounts and contracts for the same
//! address live side by side.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{Account, AccountType, Contract};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub chain_id: u64,
	pub address: Address,
}

impl CacheKey {
	pub fn new(chain_id: u64, address: Address) -> Self {
		Self { chain_id, address }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
	/// Kept until explicitly invalidated
	Never,
	After(Duration),
}

#[derive(Debug, Clone)]
pub enum CachedObject {
	Account(Arc<Account>),
	Contract(Arc<Contract>),
}

impl CachedObject {
	fn account_type(&self) -> AccountType {
		match self {
			CachedObject::Account(_) => AccountType::Wallet,
			CachedObject::Contract(_) => AccountType::Contract,
		}
	}
}

#[derive(Debug)]
struct CacheEntry {
	value: CachedObject,
	expires_at: Option<Instant>,
}

impl CacheEntry {
	fn new(value: CachedObject, expiration: Expiration) -> Self {
		let expires_at = match expiration {
			Expiration::Never => None,
			Expiration::After(ttl) => Some(Instant::now() + ttl),
		};
		Self { value, expires_at }
	}

	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// Slot of an entry: plain accounts and contracts never collide.
type Slot = (CacheKey, AccountType);

/// Concurrent cache of resolved domain objects.
#[derive(Debug, Default)]
pub struct ObjectCache {
	entries: DashMap<Slot, CacheEntry>,
}

impl ObjectCache {
	pub fn new() -> Self {
		Self::default()
	}

	fn get(&self, slot: &Slot) -> Option<CachedObject> {
		let now = Instant::now();
		if let Some(entry) = self.entries.get(slot) {
			if !entry.is_expired(now) {
				return Some(entry.value.clone());
			}
		}
		self.entries.remove_if(slot, |_, entry| entry.is_expired(now));
		None
	}

	/// Insert `value` unless a live entry already occupies the slot; returns
	/// whichever object ends up cached.
	fn insert(&self, key: CacheKey, value: CachedObject, expiration: Expiration) -> CachedObject {
		let slot = (key, value.account_type());
		match self.entries.entry(slot) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().is_expired(Instant::now()) {
					occupied.insert(CacheEntry::new(value.clone(), expiration));
					value
				} else {
					occupied.get().value.clone()
				}
			}
			Entry::Vacant(vacant) => {
				vacant.insert(CacheEntry::new(value.clone(), expiration));
				value
			}
		}
	}

	pub fn account(&self, key: &CacheKey) -> Option<Arc<Account>> {
		match self.get(&(*key, AccountType::Wallet))? {
			CachedObject::Account(account) => Some(account),
			CachedObject::Contract(_) => None,
		}
	}

	pub fn contract(&self, key: &CacheKey) -> Option<Arc<Contract>> {
		match self.get(&(*key, AccountType::Contract))? {
			CachedObject::Contract(contract) => Some(contract),
			CachedObject::Account(_) => None,
		}
	}

	/// Cache `account`, or return the account cached concurrently by another
	/// caller.
	pub fn insert_account(
		&self,
		key: CacheKey,
		account: Arc<Account>,
		expiration: Expiration,
	) -> Arc<Account> {
		match self.insert(key, CachedObject::Account(account.clone()), expiration) {
			CachedObject::Account(cached) => cached,
			CachedObject::Contract(_) => account,
		}
	}

	pub fn insert_contract(
		&self,
		key: CacheKey,
		contract: Arc<Contract>,
		expiration: Expiration,
	) -> Arc<Contract> {
		match self.insert(key, CachedObject::Contract(contract.clone()), expiration) {
			CachedObject::Contract(cached) => cached,
			CachedObject::Account(_) => contract,
		}
	}

	/// Drop both the account and the contract cached for `key`.
	pub fn invalidate(&self, key: &CacheKey) {
		self.entries.remove(&(*key, AccountType::Wallet));
		self.entries.remove(&(*key, AccountType::Contract));
	}

	/// Drop every expired entry.
	pub fn purge_expired(&self) {
		let now = Instant::now();
		self.entries.retain(|_, entry| !entry.is_expired(now));
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::provider::{ChainClient, MockChainClient};
	use alloy::primitives::Bytes;

	fn account(address: Address, code: &[u8]) -> Arc<Account> {
		let client: Arc<dyn ChainClient> = Arc::new(MockChainClient::new());
		Arc::new(Account::new(client, address, Bytes::copy_from_slice(code)))
	}

	#[test]
	fn test_keys_are_chain_scoped() {
		let cache = ObjectCache::new();
		let address = Address::repeat_byte(1);
		let mainnet = CacheKey::new(1, address);
		let sepolia = CacheKey::new(11155111, address);

		cache.insert_account(mainnet, account(address, &[]), Expiration::Never);

		assert!(cache.account(&mainnet).is_some());
		assert!(cache.account(&sepolia).is_none());
		assert!(cache.contract(&mainnet).is_none());
	}

	#[test]
	fn test_first_insert_wins() {
		let cache = ObjectCache::new();
		let address = Address::repeat_byte(1);
		let key = CacheKey::new(1, address);

		let first = cache.insert_account(key, account(address, &[]), Expiration::Never);
		let second = cache.insert_account(key, account(address, &[]), Expiration::Never);

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(cache.len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_entries_expire() {
		let cache = ObjectCache::new();
		let address = Address::repeat_byte(2);
		let key = CacheKey::new(1, address);
		let contract = Arc::new(Contract::skeleton(account(address, &[0x60])));

		cache.insert_contract(key, contract, Expiration::After(Duration::from_secs(60)));
		assert!(cache.contract(&key).is_some());

		tokio::time::advance(Duration::from_secs(61)).await;

		assert!(cache.contract(&key).is_none());
		assert!(cache.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_invalidate_and_purge() {
		let cache = ObjectCache::new();
		let kept = CacheKey::new(1, Address::repeat_byte(3));
		let stale = CacheKey::new(1, Address::repeat_byte(4));

		cache.insert_account(kept, account(kept.address, &[]), Expiration::Never);
		cache.insert_account(
			stale,
			account(stale.address, &[]),
			Expiration::After(Duration::from_secs(1)),
		);
		tokio::time::advance(Duration::from_secs(2)).await;

		cache.purge_expired();
		assert_eq!(cache.len(), 1);

		cache.invalidate(&kept);
		assert!(cache.is_empty());
	}
}
