//! Binary plan format.
//!
//! Header (60 bytes, big-endian, no padding):
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 1    | format version                 |
//! | 1      | 1    | flags (reserved, zero)         |
//! | 2      | 5    | deadline (unix seconds)        |
//! | 7      | 20   | base asset (reserved)          |
//! | 27     | 32   | minimum profit floor           |
//! | 59     | 1    | step count                     |
//!
//! Step (108 bytes + aux): venue tag, action flag, input asset, output asset,
//! input amount (0 = full balance), minimum output, aux length, aux bytes.

use arb_types::{Address, Bytes, Timestamp, U256, MAX_STEPS};
use serde::{Deserialize, Serialize};

use crate::reader::{PlanReader, PlanWriter};
use crate::CodecError;

/// Format version byte of the only supported plan layout.
pub const PLAN_FORMAT_V1: u8 = 0x10;
/// Fixed header size.
pub const HEADER_LEN: usize = 60;
/// Fixed part of each step, excluding aux bytes.
pub const STEP_FIXED_LEN: usize = 108;
/// Largest deadline representable in the 5-byte field.
pub const MAX_DEADLINE: Timestamp = (1 << 40) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanHeader {
	/// Unix timestamp after which the plan must not run.
	pub deadline: Timestamp,
	/// Reserved slot, carried through untouched.
	pub base_asset: Address,
	/// Minimum profit in loan-asset units.
	pub min_profit: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
	/// Raw venue tag; interpreted by the dispatcher.
	pub venue_tag: u8,
	/// Reserved.
	pub action: u8,
	pub asset_in: Address,
	pub asset_out: Address,
	/// Zero means "use the full current balance of `asset_in`".
	pub amount_in: U256,
	pub min_amount_out: U256,
	/// Venue-specific parameters.
	pub aux: Bytes,
}

impl Step {
	pub fn encoded_len(&self) -> usize {
		STEP_FIXED_LEN + self.aux.len()
	}

	pub fn uses_full_balance(&self) -> bool {
		self.amount_in.is_zero()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
	pub header: PlanHeader,
	pub steps: Vec<Step>,
}

impl Plan {
	pub fn new(header: PlanHeader, steps: Vec<Step>) -> Self {
		Self { header, steps }
	}

	pub fn encoded_len(&self) -> usize {
		HEADER_LEN + self.steps.iter().map(Step::encoded_len).sum::<usize>()
	}

	/// Whether the plan may still run at `now`.
	pub fn is_live(&self, now: Timestamp) -> bool {
		self.header.deadline >= now
	}

	/// Serializes the plan. Fails on values the wire format cannot carry.
	pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
		check_step_count(self.steps.len())?;
		if self.header.deadline > MAX_DEADLINE {
			return Err(CodecError::malformed(format!(
				"deadline {} does not fit in 5 bytes",
				self.header.deadline
			)));
		}

		let mut writer = PlanWriter::with_capacity(self.encoded_len());
		writer.put_u8(PLAN_FORMAT_V1);
		writer.put_u8(0);
		writer.put_u40(self.header.deadline);
		writer.put_address(&self.header.base_asset);
		writer.put_u256(&self.header.min_profit);
		writer.put_u8(self.steps.len() as u8);

		for (index, step) in self.steps.iter().enumerate() {
			let aux_len = u16::try_from(step.aux.len()).map_err(|_| {
				CodecError::malformed(format!(
					"step {} aux data of {} bytes exceeds u16",
					index,
					step.aux.len()
				))
			})?;
			writer.put_u8(step.venue_tag);
			writer.put_u8(step.action);
			writer.put_address(&step.asset_in);
			writer.put_address(&step.asset_out);
			writer.put_u256(&step.amount_in);
			writer.put_u256(&step.min_amount_out);
			writer.put_u16(aux_len);
			writer.put_bytes(&step.aux);
		}

		Ok(writer.finish())
	}

	/// Parses a plan buffer. The header's version and step bound are checked
	/// before any step byte is read.
	pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
		let mut reader = PlanReader::new(buf);
		reader.require(HEADER_LEN, "plan header")?;

		let version = reader.read_u8("format version")?;
		if version != PLAN_FORMAT_V1 {
			return Err(CodecError::malformed(format!(
				"unknown format version {:#04x}",
				version
			)));
		}
		let flags = reader.read_u8("header flags")?;
		if flags != 0 {
			return Err(CodecError::malformed(format!(
				"reserved header flags set: {:#04x}",
				flags
			)));
		}
		let deadline = reader.read_u40("deadline")?;
		let base_asset = reader.read_address("base asset")?;
		let min_profit = reader.read_u256("minimum profit")?;
		let count = reader.read_u8("step count")? as usize;
		check_step_count(count)?;

		let mut steps = Vec::with_capacity(count);
		for index in 0..count {
			reader.require(STEP_FIXED_LEN, &format!("step {}", index))?;
			let venue_tag = reader.read_u8("venue tag")?;
			let action = reader.read_u8("action flag")?;
			let asset_in = reader.read_address("input asset")?;
			let asset_out = reader.read_address("output asset")?;
			let amount_in = reader.read_u256("input amount")?;
			let min_amount_out = reader.read_u256("minimum output")?;
			let aux_len = reader.read_u16("aux length")? as usize;
			let aux = reader.read_bytes(aux_len, &format!("step {} aux data", index))?;

			steps.push(Step {
				venue_tag,
				action,
				asset_in,
				asset_out,
				amount_in,
				min_amount_out,
				aux: Bytes::copy_from_slice(aux),
			});
		}

		if reader.remaining() != 0 {
			return Err(CodecError::malformed(format!(
				"{} trailing bytes after {} steps",
				reader.remaining(),
				count
			)));
		}

		Ok(Plan {
			header: PlanHeader {
				deadline,
				base_asset,
				min_profit,
			},
			steps,
		})
	}
}

fn check_step_count(count: usize) -> Result<(), CodecError> {
	if count == 0 {
		return Err(CodecError::malformed("plan has no steps"));
	}
	if count > MAX_STEPS {
		return Err(CodecError::malformed(format!(
			"{} steps exceeds maximum of {}",
			count, MAX_STEPS
		)));
	}
	Ok(())
}
