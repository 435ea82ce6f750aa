//! Import of the `/commit` RPC document into a normalized [`SignedHeader`].
//!
//! The importer is strict: verification relies on every length, so any shape
//! or length violation is fatal here rather than a per-signature verdict
//! later. Binary fields arrive hex-encoded (addresses, hashes) or
//! base64-encoded (signatures); integers arrive as decimal strings or JSON
//! numbers depending on the node version, and both forms are accepted.

use base64::{engine::general_purpose, Engine};
use color_eyre::{
	eyre::{ensure, eyre},
	Result,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::types::{
	BlockId, BlockIdFlag, Commit, CommitSig, Header, PartSetHeader, SignedHeader, Time, Version,
	ADDRESS_LEN, HASH_LEN, SIGNATURE_LEN,
};

#[derive(Debug, Deserialize)]
struct CommitDoc {
	signed_header: RawSignedHeader,
}

#[derive(Debug, Deserialize)]
struct RawSignedHeader {
	header: RawHeader,
	commit: RawCommit,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
	#[serde(default)]
	version: Option<RawVersion>,
	chain_id: String,
	height: JsonInt,
	time: String,
	#[serde(default)]
	last_block_id: Option<RawBlockId>,
	last_commit_hash: String,
	data_hash: String,
	validators_hash: String,
	next_validators_hash: String,
	consensus_hash: String,
	app_hash: String,
	last_results_hash: String,
	evidence_hash: String,
	proposer_address: String,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
	#[serde(default)]
	block: Option<JsonInt>,
	#[serde(default)]
	app: Option<JsonInt>,
}

#[derive(Debug, Deserialize)]
struct RawBlockId {
	hash: String,
	parts: RawParts,
}

#[derive(Debug, Deserialize)]
struct RawParts {
	total: JsonInt,
	hash: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
	height: JsonInt,
	round: JsonInt,
	block_id: RawBlockId,
	signatures: Vec<RawCommitSig>,
}

#[derive(Debug, Deserialize)]
struct RawCommitSig {
	block_id_flag: JsonInt,
	validator_address: String,
	#[serde(default)]
	timestamp: Option<String>,
	#[serde(default)]
	signature: Option<String>,
}

/// Non-negative integer field that nodes serialize either as a JSON number
/// or as a decimal string, depending on their version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonInt {
	Number(u64),
	Text(String),
}

impl JsonInt {
	fn value(&self, field: &str) -> Result<u64> {
		match self {
			JsonInt::Number(value) => Ok(*value),
			JsonInt::Text(text) => text
				.parse()
				.map_err(|error| eyre!("Invalid {field} '{text}': {error}")),
		}
	}
}

/// Imports the `/commit` document for a height.
///
/// The caller is responsible for unwrapping any JSON-RPC envelope first;
/// `doc` is the object carrying `signed_header`.
pub fn import_signed_header(doc: &Value) -> Result<SignedHeader> {
	let commit_doc: CommitDoc = serde_json::from_value(doc.clone())
		.map_err(|error| eyre!("Malformed commit document: {error}"))?;

	let header = import_header(&commit_doc.signed_header.header)?;
	let commit = import_commit(&commit_doc.signed_header.commit)?;

	ensure!(
		header.height == commit.height,
		"Header height {} does not match commit height {}",
		header.height,
		commit.height
	);

	debug!(
		"Imported signed header for chain {} at height {} with {} signatures",
		header.chain_id,
		header.height,
		commit.signatures.len()
	);

	Ok(SignedHeader { header, commit })
}

fn import_header(raw: &RawHeader) -> Result<Header> {
	let version = match &raw.version {
		Some(raw_version) => Version {
			block: match &raw_version.block {
				Some(block) => block.value("version.block")?,
				None => 0,
			},
			app: match &raw_version.app {
				Some(app) => app.value("version.app")?,
				None => 0,
			},
		},
		None => Version::default(),
	};

	Ok(Header {
		version,
		chain_id: raw.chain_id.clone(),
		height: raw.height.value("header.height")?,
		time: Time::parse_rfc3339(&raw.time)?,
		last_block_id: import_last_block_id(raw.last_block_id.as_ref())?,
		last_commit_hash: hash32(&raw.last_commit_hash, "last_commit_hash")?,
		data_hash: hash32(&raw.data_hash, "data_hash")?,
		validators_hash: hash32(&raw.validators_hash, "validators_hash")?,
		next_validators_hash: hash32(&raw.next_validators_hash, "next_validators_hash")?,
		consensus_hash: hash32(&raw.consensus_hash, "consensus_hash")?,
		app_hash: hex::decode(&raw.app_hash)
			.map_err(|error| eyre!("Invalid hex in app_hash: {error}"))?,
		last_results_hash: hash32(&raw.last_results_hash, "last_results_hash")?,
		evidence_hash: hash32(&raw.evidence_hash, "evidence_hash")?,
		proposer_address: address20(&raw.proposer_address, "proposer_address")?,
	})
}

fn import_commit(raw: &RawCommit) -> Result<Commit> {
	let round = raw.round.value("commit.round")?;
	let round = u32::try_from(round).map_err(|_| eyre!("Commit round {round} out of range"))?;

	ensure!(!raw.signatures.is_empty(), "Commit has no signatures");

	let signatures = raw
		.signatures
		.iter()
		.map(import_commit_sig)
		.collect::<Result<Vec<CommitSig>>>()?;

	Ok(Commit {
		height: raw.height.value("commit.height")?,
		round,
		block_id: import_block_id(&raw.block_id, "commit.block_id")?,
		signatures,
	})
}

fn import_commit_sig(raw: &RawCommitSig) -> Result<CommitSig> {
	let flag = raw.block_id_flag.value("block_id_flag")?;

	let signature = match raw.signature.as_deref() {
		None | Some("") => Vec::new(),
		Some(encoded) => {
			let bytes = general_purpose::STANDARD
				.decode(encoded)
				.map_err(|error| eyre!("Invalid base64 signature: {error}"))?;
			ensure!(
				bytes.len() == SIGNATURE_LEN,
				"Signature is {} bytes, expected {SIGNATURE_LEN}",
				bytes.len()
			);
			bytes
		},
	};

	let timestamp = match raw.timestamp.as_deref() {
		None | Some("") => None,
		Some(text) => Some(Time::parse_rfc3339(text)?),
	};

	Ok(CommitSig {
		block_id_flag: BlockIdFlag::try_from(flag)?,
		validator_address: address20(&raw.validator_address, "validator_address")?,
		timestamp,
		signature,
	})
}

fn import_block_id(raw: &RawBlockId, field: &str) -> Result<BlockId> {
	let total = raw.parts.total.value("parts.total")?;
	Ok(BlockId {
		hash: hash32(&raw.hash, &format!("{field}.hash"))?,
		part_set_header: PartSetHeader {
			total: u32::try_from(total)
				.map_err(|_| eyre!("{field} parts.total {total} out of range"))?,
			hash: hash32(&raw.parts.hash, &format!("{field}.parts.hash"))?,
		},
	})
}

// The block before genesis does not exist; its id is serialized with empty
// hashes and normalizes to no id at all.
fn import_last_block_id(raw: Option<&RawBlockId>) -> Result<Option<BlockId>> {
	match raw {
		None => Ok(None),
		Some(raw) if raw.hash.is_empty() && raw.parts.hash.is_empty() => Ok(None),
		Some(raw) => import_block_id(raw, "last_block_id").map(Some),
	}
}

fn hash32(encoded: &str, field: &str) -> Result<Vec<u8>> {
	let bytes =
		hex::decode(encoded).map_err(|error| eyre!("Invalid hex in {field}: {error}"))?;
	ensure!(
		bytes.len() == HASH_LEN,
		"Field {field} is {} bytes, expected {HASH_LEN}",
		bytes.len()
	);
	Ok(bytes)
}

fn address20(encoded: &str, field: &str) -> Result<[u8; ADDRESS_LEN]> {
	let bytes =
		hex::decode(encoded).map_err(|error| eyre!("Invalid hex in {field}: {error}"))?;
	bytes.as_slice().try_into().map_err(|_| {
		eyre!(
			"Field {field} is {} bytes, expected {ADDRESS_LEN}",
			bytes.len()
		)
	})
}
