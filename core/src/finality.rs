//! Commit verification against an imported validator set.
//!
//! Every commit vote is classified exactly once: skipped (absent/nil),
//! unknown (address not in the set), invalid (no signature, no verifier key,
//! or a failed Ed25519 check), or counted into the signed voting power. The
//! commit is accepted when the successfully signed power is a strict
//! super-majority of the set's total power.

use std::collections::HashSet;

use color_eyre::{eyre::ensure, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::{info, warn};

use crate::{
	types::{BlockIdFlag, CryptoIndex, SignedHeader, ValidatorSet, VerifyOutcome},
	vote,
};

/// Verifies a commit against the validator set of its height.
///
/// Malformed inputs fail with an error before any signature is touched.
/// Per-signature verdicts never do: they are reported in the returned
/// [`VerifyOutcome`], and verification always runs to completion.
pub fn verify_commit(
	signed_header: &SignedHeader,
	validator_set: &ValidatorSet,
	crypto_index: &CryptoIndex,
) -> Result<VerifyOutcome> {
	check_preconditions(signed_header, validator_set)?;

	let header = &signed_header.header;
	let commit = &signed_header.commit;
	let total_power = validator_set.total_voting_power();

	let mut signed_power: u128 = 0;
	let mut signed_addresses = HashSet::new();
	let mut unknown_validators = Vec::new();
	let mut invalid_signatures = Vec::new();
	let mut counted_signatures = 0usize;

	for commit_sig in &commit.signatures {
		// Absent and Nil votes are not counted, not invalid, not unknown
		if commit_sig.block_id_flag != BlockIdFlag::Commit {
			continue;
		}

		let address = hex::encode_upper(commit_sig.validator_address);
		let Some(validator) = validator_set.by_address(&address) else {
			warn!("Commit vote from unknown validator {address} at height {}", commit.height);
			unknown_validators.push(address);
			continue;
		};

		counted_signatures += 1;

		if commit_sig.signature.is_empty() {
			warn!("Commit vote from validator {address} carries no signature");
			invalid_signatures.push(address);
			continue;
		}

		let Some(verifier) = crypto_index.verifier(&address) else {
			warn!("No verifier key for validator {address}");
			invalid_signatures.push(address);
			continue;
		};

		let message = vote::sign_bytes(commit, commit_sig.timestamp, &header.chain_id);
		if verify_signature(verifier, &commit_sig.signature, &message) {
			// a validator's power counts once, however often it appears
			if signed_addresses.insert(address.clone()) {
				signed_power += u128::from(validator.voting_power);
			} else {
				warn!("Repeated commit vote from validator {address} ignored");
			}
		} else {
			warn!(
				"Failed signature verification for validator {address} at height {}, round {}",
				commit.height, commit.round
			);
			invalid_signatures.push(address);
		}
	}

	let quorum = has_quorum(signed_power, total_power);
	info!(
		"Signed power {signed_power}/{total_power} over {counted_signatures} counted signatures \
		 at height {}, quorum: {quorum}",
		commit.height
	);

	Ok(VerifyOutcome {
		ok: quorum,
		quorum,
		signed_power,
		total_power,
		header_time: Some(header.time),
		app_hash: header.app_hash.clone(),
		block_id_hash: commit.block_id.hash.clone(),
		unknown_validators,
		invalid_signatures,
		counted_signatures,
	})
}

// A caller holding this state has a bug; none of it is evidence about the
// commit itself, so it fails instead of producing an outcome.
fn check_preconditions(signed_header: &SignedHeader, validator_set: &ValidatorSet) -> Result<()> {
	let header = &signed_header.header;
	let commit = &signed_header.commit;

	ensure!(
		header.height == commit.height,
		"Header height {} does not match commit height {}",
		header.height,
		commit.height
	);
	ensure!(!validator_set.is_empty(), "Validator set is empty");
	ensure!(
		validator_set.total_voting_power() > 0,
		"Validator set has no voting power"
	);
	ensure!(
		validator_set.has_distinct_addresses(),
		"Validator set contains duplicate addresses"
	);
	ensure!(!commit.block_id.hash.is_empty(), "Commit block_id.hash is empty");
	ensure!(
		!commit.block_id.part_set_header.hash.is_empty(),
		"Commit part_set_header.hash is empty"
	);

	Ok(())
}

/// Strict super-majority: more than two-thirds of the total power signed.
/// Multiply before comparing; 128-bit operands keep the products exact.
fn has_quorum(signed_power: u128, total_power: u128) -> bool {
	signed_power * 3 > total_power * 2
}

fn verify_signature(verifier: &VerifyingKey, signature: &[u8], message: &[u8]) -> bool {
	let Ok(signature) = Signature::from_slice(signature) else {
		return false;
	};
	verifier.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{
		BlockId, Commit, CommitSig, Header, PartSetHeader, Time, Validator, Version, ADDRESS_LEN,
		HASH_LEN, PUBLIC_KEY_LEN,
	};
	use test_case::test_case;

	#[test_case(1, 1 => true)]
	#[test_case(0, 1 => false)]
	#[test_case(2, 3 => false)]
	#[test_case(3, 4 => true)]
	#[test_case(2, 4 => false)]
	#[test_case(66, 100 => false)]
	#[test_case(67, 100 => true)]
	#[test_case(u128::from(u64::MAX) * 3, u128::from(u64::MAX) * 4 => true; "wide operands")]
	#[test_case(u128::from(u64::MAX) * 2, u128::from(u64::MAX) * 3 => false; "wide boundary")]
	fn check_quorum_condition(signed_power: u128, total_power: u128) -> bool {
		has_quorum(signed_power, total_power)
	}

	fn signed_header(height: u64, commit_height: u64) -> SignedHeader {
		SignedHeader {
			header: Header {
				version: Version::default(),
				chain_id: "test-chain".to_string(),
				height,
				time: Time::default(),
				last_block_id: None,
				last_commit_hash: vec![0; HASH_LEN],
				data_hash: vec![0; HASH_LEN],
				validators_hash: vec![0; HASH_LEN],
				next_validators_hash: vec![0; HASH_LEN],
				consensus_hash: vec![0; HASH_LEN],
				app_hash: vec![],
				last_results_hash: vec![0; HASH_LEN],
				evidence_hash: vec![0; HASH_LEN],
				proposer_address: [0; ADDRESS_LEN],
			},
			commit: Commit {
				height: commit_height,
				round: 0,
				block_id: BlockId {
					hash: vec![0xAA; HASH_LEN],
					part_set_header: PartSetHeader {
						total: 1,
						hash: vec![0xBB; HASH_LEN],
					},
				},
				signatures: vec![CommitSig {
					block_id_flag: BlockIdFlag::Commit,
					validator_address: [0x11; ADDRESS_LEN],
					timestamp: None,
					signature: vec![],
				}],
			},
		}
	}

	fn single_validator_set() -> ValidatorSet {
		ValidatorSet::new(
			5,
			vec![Validator {
				address: [0x11; ADDRESS_LEN],
				public_key: [0x22; PUBLIC_KEY_LEN],
				voting_power: 1,
			}],
		)
		.unwrap()
	}

	#[test]
	fn rejects_height_mismatch() {
		let error = verify_commit(
			&signed_header(5, 6),
			&single_validator_set(),
			&CryptoIndex::default(),
		)
		.unwrap_err();
		assert!(error.to_string().contains("does not match commit height"));
	}

	#[test]
	fn rejects_empty_block_id_hash() {
		let mut header = signed_header(5, 5);
		header.commit.block_id.hash.clear();

		let error = verify_commit(&header, &single_validator_set(), &CryptoIndex::default())
			.unwrap_err();
		assert!(error.to_string().contains("block_id.hash is empty"));
	}

	#[test]
	fn rejects_empty_part_set_hash() {
		let mut header = signed_header(5, 5);
		header.commit.block_id.part_set_header.hash.clear();

		let error = verify_commit(&header, &single_validator_set(), &CryptoIndex::default())
			.unwrap_err();
		assert!(error.to_string().contains("part_set_header.hash is empty"));
	}

	#[test]
	fn missing_signature_is_reported_not_fatal() {
		let outcome = verify_commit(
			&signed_header(5, 5),
			&single_validator_set(),
			&CryptoIndex::default(),
		)
		.unwrap();

		assert!(!outcome.ok);
		assert!(!outcome.quorum);
		assert_eq!(outcome.signed_power, 0);
		assert_eq!(outcome.total_power, 1);
		assert_eq!(outcome.counted_signatures, 1);
		assert_eq!(outcome.invalid_signatures, vec!["11".repeat(20)]);
		assert!(outcome.unknown_validators.is_empty());
	}

	#[test]
	fn nil_votes_are_skipped_entirely() {
		let mut header = signed_header(5, 5);
		header.commit.signatures[0].block_id_flag = BlockIdFlag::Nil;

		let outcome = verify_commit(
			&header,
			&single_validator_set(),
			&CryptoIndex::default(),
		)
		.unwrap();

		assert_eq!(outcome.counted_signatures, 0);
		assert!(outcome.invalid_signatures.is_empty());
		assert!(outcome.unknown_validators.is_empty());
	}

	#[test]
	fn unknown_address_is_reported() {
		let mut header = signed_header(5, 5);
		header.commit.signatures[0].validator_address = [0xFF; ADDRESS_LEN];

		let outcome = verify_commit(
			&header,
			&single_validator_set(),
			&CryptoIndex::default(),
		)
		.unwrap();

		assert_eq!(outcome.counted_signatures, 0);
		assert_eq!(outcome.unknown_validators, vec!["FF".repeat(20)]);
		assert!(outcome.invalid_signatures.is_empty());
	}

	#[test]
	fn outcome_echoes_header_fields() {
		let mut header = signed_header(5, 5);
		header.header.app_hash = vec![0x0F, 0x0E];
		header.header.time = Time {
			seconds: 77,
			nanos: 8,
		};

		let outcome = verify_commit(
			&header,
			&single_validator_set(),
			&CryptoIndex::default(),
		)
		.unwrap();

		assert_eq!(outcome.app_hash, vec![0x0F, 0x0E]);
		assert_eq!(
			outcome.header_time,
			Some(Time {
				seconds: 77,
				nanos: 8,
			})
		);
		assert_eq!(outcome.block_id_hash, vec![0xAA; HASH_LEN]);
	}
}
