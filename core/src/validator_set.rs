//! Import of the `/validators` RPC document into a [`ValidatorSet`].
//!
//! The listing must be a single page covering the full set: every validator
//! carries an Ed25519 key, its address is rebound to the key by hashing, and
//! the total voting power is accumulated in wide arithmetic. Keys that fail
//! to materialize as verifier handles keep their validator in the set but
//! stay out of the [`CryptoIndex`], leaving their signatures unverifiable.

use base64::{engine::general_purpose, Engine};
use color_eyre::{
	eyre::{ensure, eyre},
	Result,
};
use ed25519_dalek::VerifyingKey;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
	types::{CryptoIndex, Validator, ValidatorSet, ED25519_KEY_TYPE, PUBLIC_KEY_LEN},
	utils::key_address,
};

#[derive(Debug, Deserialize)]
struct ValidatorsPage {
	block_height: String,
	validators: Vec<ValidatorEntry>,
	count: String,
	total: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorEntry {
	address: String,
	pub_key: PubKey,
	voting_power: String,
}

#[derive(Debug, Deserialize)]
struct PubKey {
	#[serde(rename = "type")]
	key_type: String,
	value: String,
}

/// Imports the `/validators` listing for a height.
///
/// The caller is responsible for unwrapping any JSON-RPC envelope first;
/// `doc` is the inner object carrying `block_height`, `validators`, `count`
/// and `total`.
pub fn import_validator_set(doc: &Value) -> Result<(ValidatorSet, CryptoIndex)> {
	let page: ValidatorsPage = serde_json::from_value(doc.clone())
		.map_err(|error| eyre!("Malformed validators document: {error}"))?;

	let height: u64 = page
		.block_height
		.parse()
		.map_err(|error| eyre!("Invalid block_height '{}': {error}", page.block_height))?;
	let count: u64 = page
		.count
		.parse()
		.map_err(|error| eyre!("Invalid count '{}': {error}", page.count))?;
	let total: u64 = page
		.total
		.parse()
		.map_err(|error| eyre!("Invalid total '{}': {error}", page.total))?;

	ensure!(
		count == total,
		"Validators listing must not paginate: count {count} != total {total}"
	);
	ensure!(count >= 2, "Validators listing needs at least 2 validators, got {count}");
	ensure!(!page.validators.is_empty(), "Validators list is empty");
	ensure!(
		page.validators.len() as u64 == total,
		"Validators list has {} entries, total says {total}",
		page.validators.len()
	);

	let claimed_addresses: Vec<String> = page
		.validators
		.iter()
		.map(|entry| entry.address.to_uppercase())
		.collect();
	let duplicates: Vec<&String> = claimed_addresses.iter().duplicates().collect();
	ensure!(
		duplicates.is_empty(),
		"Duplicate validator address(es) in listing: {duplicates:?}"
	);

	let mut validators = Vec::with_capacity(page.validators.len());
	let mut crypto_index = CryptoIndex::default();

	for (entry, claimed) in page.validators.iter().zip(&claimed_addresses) {
		ensure!(
			entry.address.len() == 40,
			"Validator address '{}' is not 40 hex characters",
			entry.address
		);
		ensure!(
			entry.pub_key.key_type == ED25519_KEY_TYPE,
			"Unsupported public key type '{}' for validator {claimed}",
			entry.pub_key.key_type
		);

		let raw_key = general_purpose::STANDARD
			.decode(&entry.pub_key.value)
			.map_err(|error| eyre!("Invalid base64 public key for validator {claimed}: {error}"))?;
		let public_key: [u8; PUBLIC_KEY_LEN] = raw_key.as_slice().try_into().map_err(|_| {
			eyre!(
				"Public key of validator {claimed} is {} bytes, expected {PUBLIC_KEY_LEN}",
				raw_key.len()
			)
		})?;

		let voting_power: u64 = entry
			.voting_power
			.parse()
			.map_err(|error| eyre!("Invalid voting_power '{}' for validator {claimed}: {error}", entry.voting_power))?;
		ensure!(
			voting_power >= 1,
			"Validator {claimed} has non-positive voting power"
		);

		let address = key_address(&public_key);
		let derived = hex::encode_upper(address);
		ensure!(
			&derived == claimed,
			"Validator address {claimed} does not match its public key (derived {derived})"
		);

		match VerifyingKey::from_bytes(&public_key) {
			Ok(verifier) => crypto_index.insert(derived, verifier),
			Err(error) => {
				warn!("Cannot materialize verifier key for validator {claimed}: {error}");
			},
		}

		validators.push(Validator {
			address,
			public_key,
			voting_power,
		});
	}

	let validator_set = ValidatorSet::new(height, validators)?;
	debug!(
		"Imported {} validators at height {height}, total power {}",
		validator_set.len(),
		validator_set.total_voting_power()
	);

	Ok((validator_set, crypto_index))
}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::SigningKey;
	use serde_json::json;

	fn seed_key(seed: u8) -> [u8; PUBLIC_KEY_LEN] {
		SigningKey::from_bytes(&[seed; 32])
			.verifying_key()
			.to_bytes()
	}

	fn entry(public_key: &[u8; PUBLIC_KEY_LEN], power: &str) -> Value {
		json!({
			"address": hex::encode_upper(key_address(public_key)),
			"pub_key": {
				"type": ED25519_KEY_TYPE,
				"value": general_purpose::STANDARD.encode(public_key),
			},
			"voting_power": power,
			"proposer_priority": "0",
		})
	}

	fn listing(entries: Vec<Value>, count: &str, total: &str) -> Value {
		json!({
			"block_height": "42",
			"validators": entries,
			"count": count,
			"total": total,
		})
	}

	#[test]
	fn imports_full_single_page() {
		let doc = listing(
			vec![entry(&seed_key(1), "5"), entry(&seed_key(2), "7")],
			"2",
			"2",
		);

		let (set, index) = import_validator_set(&doc).unwrap();

		assert_eq!(set.height(), 42);
		assert_eq!(set.len(), 2);
		assert_eq!(set.total_voting_power(), 12);
		assert_eq!(index.len(), 2);

		// order preserved as given
		assert_eq!(set.validators()[0].voting_power, 5);
		assert_eq!(set.validators()[1].voting_power, 7);

		let address = set.validators()[0].address_hex();
		assert!(set.by_address(&address).is_some());
		assert!(index.verifier(&address).is_some());
	}

	#[test]
	fn lowercase_addresses_are_normalized() {
		let key = seed_key(1);
		let mut first = entry(&key, "1");
		first["address"] = json!(hex::encode(key_address(&key)));
		let doc = listing(vec![first, entry(&seed_key(2), "1")], "2", "2");

		let (set, _) = import_validator_set(&doc).unwrap();
		assert!(set
			.by_address(&hex::encode_upper(key_address(&key)))
			.is_some());
	}

	#[test]
	fn rejects_pagination() {
		let doc = listing(
			vec![entry(&seed_key(1), "1"), entry(&seed_key(2), "1")],
			"2",
			"3",
		);
		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("must not paginate"));
	}

	#[test]
	fn rejects_single_validator_listing() {
		let doc = listing(vec![entry(&seed_key(1), "1")], "1", "1");
		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("at least 2 validators"));
	}

	#[test]
	fn rejects_entry_count_total_mismatch() {
		let doc = listing(
			vec![entry(&seed_key(1), "1"), entry(&seed_key(2), "1")],
			"3",
			"3",
		);
		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("total says 3"));
	}

	#[test]
	fn rejects_address_key_mismatch() {
		let mut tampered = entry(&seed_key(1), "1");
		tampered["address"] = json!(hex::encode_upper(key_address(&seed_key(9))));
		let doc = listing(vec![tampered, entry(&seed_key(2), "1")], "2", "2");

		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("does not match its public key"));
	}

	#[test]
	fn rejects_unsupported_key_type() {
		let mut bad = entry(&seed_key(1), "1");
		bad["pub_key"]["type"] = json!("tendermint/PubKeySecp256k1");
		let doc = listing(vec![bad, entry(&seed_key(2), "1")], "2", "2");

		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("Unsupported public key type"));
	}

	#[test]
	fn rejects_short_key() {
		let mut bad = entry(&seed_key(1), "1");
		bad["pub_key"]["value"] = json!(general_purpose::STANDARD.encode([0u8; 31]));
		let doc = listing(vec![bad, entry(&seed_key(2), "1")], "2", "2");

		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("31 bytes"));
	}

	#[test]
	fn rejects_zero_power() {
		let doc = listing(
			vec![entry(&seed_key(1), "0"), entry(&seed_key(2), "1")],
			"2",
			"2",
		);
		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("non-positive voting power"));
	}

	#[test]
	fn rejects_duplicate_addresses() {
		let doc = listing(
			vec![entry(&seed_key(1), "1"), entry(&seed_key(1), "2")],
			"2",
			"2",
		);
		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("Duplicate validator address"));
	}

	#[test]
	fn rejects_bad_address_length() {
		let mut bad = entry(&seed_key(1), "1");
		bad["address"] = json!("ABCDEF");
		let doc = listing(vec![bad, entry(&seed_key(2), "1")], "2", "2");

		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("not 40 hex characters"));
	}

	#[test]
	fn rejects_missing_fields() {
		let doc = json!({
			"block_height": "42",
			"validators": [],
			"count": "2",
		});
		let error = import_validator_set(&doc).unwrap_err().to_string();
		assert!(error.contains("Malformed validators document"));
	}

	#[test]
	fn unverifiable_key_stays_out_of_the_index() {
		// y = 2 is not on the curve: the address binding holds but no
		// verifier handle can be built from the key.
		let mut bogus = [0u8; PUBLIC_KEY_LEN];
		bogus[0] = 0x02;
		let doc = listing(vec![entry(&bogus, "1"), entry(&seed_key(2), "1")], "2", "2");

		let (set, index) = import_validator_set(&doc).unwrap();
		assert_eq!(set.len(), 2);
		assert_eq!(index.len(), 1);
		assert!(index
			.verifier(&hex::encode_upper(key_address(&bogus)))
			.is_none());
	}
}
