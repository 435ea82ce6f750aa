//! Shared commit verifier structs and enums.
use std::collections::HashMap;

use chrono::DateTime;
use color_eyre::{
	eyre::{ensure, eyre},
	Report, Result,
};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

pub const ADDRESS_LEN: usize = 20;
pub const HASH_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// The only public key type accepted by the validator-set importer.
pub const ED25519_KEY_TYPE: &str = "tendermint/PubKeyEd25519";

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point in time as signed epoch seconds plus a sub-second nanosecond part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
	pub seconds: i64,
	pub nanos: u32,
}

impl Time {
	pub fn new(seconds: i64, nanos: u32) -> Result<Self> {
		ensure!(nanos < NANOS_PER_SEC, "Nanoseconds {nanos} out of range");
		Ok(Time { seconds, nanos })
	}

	/// Parses an RFC 3339 timestamp with up to nine fractional digits.
	///
	/// The fractional part is right-padded to nanosecond precision; a missing
	/// fraction yields zero nanoseconds.
	pub fn parse_rfc3339(value: &str) -> Result<Self> {
		let time = DateTime::parse_from_rfc3339(value)
			.map_err(|error| eyre!("Invalid RFC 3339 timestamp '{value}': {error}"))?;
		Time::new(time.timestamp(), time.timestamp_subsec_nanos())
	}
}

/// The total part count and combined hash of a block's part set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSetHeader {
	pub total: u32,
	pub hash: Vec<u8>,
}

/// Canonical identity of a block: its hash and the part-set header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockId {
	pub hash: Vec<u8>,
	pub part_set_header: PartSetHeader,
}

/// Block and app protocol versions carried by the header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
	pub block: u64,
	pub app: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
	pub version: Version,
	pub chain_id: String,
	pub height: u64,
	pub time: Time,
	pub last_block_id: Option<BlockId>,
	pub last_commit_hash: Vec<u8>,
	pub data_hash: Vec<u8>,
	pub validators_hash: Vec<u8>,
	pub next_validators_hash: Vec<u8>,
	pub consensus_hash: Vec<u8>,
	/// Application-defined, accepted at any length.
	pub app_hash: Vec<u8>,
	pub last_results_hash: Vec<u8>,
	pub evidence_hash: Vec<u8>,
	pub proposer_address: [u8; ADDRESS_LEN],
}

/// How a validator voted in the commit. The wire value 0 is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockIdFlag {
	Absent = 1,
	Commit = 2,
	Nil = 3,
}

impl TryFrom<u64> for BlockIdFlag {
	type Error = Report;

	fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
		match value {
			1 => Ok(BlockIdFlag::Absent),
			2 => Ok(BlockIdFlag::Commit),
			3 => Ok(BlockIdFlag::Nil),
			_ => Err(eyre!("Unknown block_id_flag {value}")),
		}
	}
}

/// A single validator's entry in a commit, kept in commit order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSig {
	pub block_id_flag: BlockIdFlag,
	pub validator_address: [u8; ADDRESS_LEN],
	pub timestamp: Option<Time>,
	/// Empty for non-commit votes, otherwise exactly 64 bytes.
	pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
	pub height: u64,
	pub round: u32,
	pub block_id: BlockId,
	pub signatures: Vec<CommitSig>,
}

/// A header together with the commit certifying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHeader {
	pub header: Header,
	pub commit: Commit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validator {
	pub address: [u8; ADDRESS_LEN],
	pub public_key: [u8; PUBLIC_KEY_LEN],
	pub voting_power: u64,
}

impl Validator {
	pub fn address_hex(&self) -> String {
		hex::encode_upper(self.address)
	}
}

/// An imported validator set with its address index and total voting power.
///
/// Constructed once by the importer and immutable afterwards; the index maps
/// uppercase hex addresses to positions in the original validator order.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorSet {
	height: u64,
	total_voting_power: u128,
	validators: Vec<Validator>,
	address_index: HashMap<String, usize>,
}

impl ValidatorSet {
	pub fn new(height: u64, validators: Vec<Validator>) -> Result<Self> {
		ensure!(!validators.is_empty(), "Validator set is empty");

		let mut address_index = HashMap::with_capacity(validators.len());
		for (position, validator) in validators.iter().enumerate() {
			let address = validator.address_hex();
			ensure!(
				address_index.insert(address, position).is_none(),
				"Duplicate validator address {}",
				validator.address_hex()
			);
		}

		let total_voting_power = validators
			.iter()
			.map(|validator| u128::from(validator.voting_power))
			.sum();
		ensure!(total_voting_power > 0, "Validator set has no voting power");

		Ok(ValidatorSet {
			height,
			total_voting_power,
			validators,
			address_index,
		})
	}

	pub fn height(&self) -> u64 {
		self.height
	}

	pub fn total_voting_power(&self) -> u128 {
		self.total_voting_power
	}

	pub fn len(&self) -> usize {
		self.validators.len()
	}

	pub fn is_empty(&self) -> bool {
		self.validators.is_empty()
	}

	/// Validators in the order the listing gave them; commit signatures are
	/// positionally aligned with this order by the producer.
	pub fn validators(&self) -> &[Validator] {
		&self.validators
	}

	pub fn by_address(&self, address: &str) -> Option<&Validator> {
		self.address_index
			.get(address)
			.map(|&position| &self.validators[position])
	}

	pub fn has_distinct_addresses(&self) -> bool {
		self.address_index.len() == self.validators.len()
	}
}

/// Ed25519 verifier handles keyed by uppercase hex validator address.
///
/// An absent entry means the key could not be materialized at import time,
/// which is distinct from the address being unknown to the validator set.
#[derive(Clone, Debug, Default)]
pub struct CryptoIndex {
	keys: HashMap<String, VerifyingKey>,
}

impl CryptoIndex {
	pub fn insert(&mut self, address: String, key: VerifyingKey) {
		self.keys.insert(address, key);
	}

	pub fn verifier(&self, address: &str) -> Option<&VerifyingKey> {
		self.keys.get(address)
	}

	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}

/// The structured verdict of a commit verification.
///
/// Power values are serialized as decimal strings and byte fields as
/// uppercase hex, matching the RPC convention of the input documents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
	pub ok: bool,
	pub quorum: bool,
	#[serde(with = "power_string_format")]
	pub signed_power: u128,
	#[serde(with = "power_string_format")]
	pub total_power: u128,
	pub header_time: Option<Time>,
	#[serde(with = "hex_bytes_format")]
	pub app_hash: Vec<u8>,
	#[serde(with = "hex_bytes_format")]
	pub block_id_hash: Vec<u8>,
	/// Addresses of commit votes not present in the validator set, in commit order.
	pub unknown_validators: Vec<String>,
	/// Addresses of known validators whose signatures did not verify, in commit order.
	pub invalid_signatures: Vec<String>,
	pub counted_signatures: usize,
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

pub mod hex_bytes_format {
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&hex::encode_upper(bytes))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		hex::decode(value).map_err(serde::de::Error::custom)
	}
}

pub mod power_string_format {
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(power: &u128, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&power.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		value.parse().map_err(serde::de::Error::custom)
	}
}
