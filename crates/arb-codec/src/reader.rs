//! Bounds-checked cursor over a plan buffer.
//!
//! Every read checks the remaining length first, so no arithmetic on raw
//! offsets ever reaches the caller.

use arb_types::{Address, U256};
use bytes::{Buf, BufMut};

use crate::CodecError;

/// Typed reader that advances through a borrowed buffer.
pub struct PlanReader<'a> {
	buf: &'a [u8],
	total: usize,
}

impl<'a> PlanReader<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
			total: buf.len(),
		}
	}

	/// Bytes not consumed yet.
	pub fn remaining(&self) -> usize {
		self.buf.remaining()
	}

	/// Offset of the cursor from the start of the buffer.
	pub fn position(&self) -> usize {
		self.total - self.buf.remaining()
	}

	/// Fails unless at least `len` more bytes are available.
	pub fn require(&self, len: usize, what: &str) -> Result<(), CodecError> {
		if self.buf.remaining() < len {
			return Err(CodecError::malformed(format!(
				"{} needs {} bytes at offset {}, only {} left",
				what,
				len,
				self.position(),
				self.buf.remaining()
			)));
		}
		Ok(())
	}

	pub fn read_u8(&mut self, what: &str) -> Result<u8, CodecError> {
		self.require(1, what)?;
		Ok(self.buf.get_u8())
	}

	pub fn read_u16(&mut self, what: &str) -> Result<u16, CodecError> {
		self.require(2, what)?;
		Ok(self.buf.get_u16())
	}

	/// Reads a 5-byte big-endian unsigned integer.
	pub fn read_u40(&mut self, what: &str) -> Result<u64, CodecError> {
		self.require(5, what)?;
		Ok(self.buf.get_uint(5))
	}

	pub fn read_address(&mut self, what: &str) -> Result<Address, CodecError> {
		self.require(20, what)?;
		let mut raw = [0u8; 20];
		self.buf.copy_to_slice(&mut raw);
		Ok(Address::from(raw))
	}

	pub fn read_u256(&mut self, what: &str) -> Result<U256, CodecError> {
		self.require(32, what)?;
		let mut raw = [0u8; 32];
		self.buf.copy_to_slice(&mut raw);
		Ok(U256::from_be_bytes(raw))
	}

	pub fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], CodecError> {
		self.require(len, what)?;
		let buf: &'a [u8] = self.buf;
		let (head, tail) = buf.split_at(len);
		self.buf = tail;
		Ok(head)
	}
}

/// Append-only writer producing the packed big-endian layout.
#[derive(Default)]
pub struct PlanWriter {
	out: Vec<u8>,
}

impl PlanWriter {
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			out: Vec::with_capacity(capacity),
		}
	}

	pub fn put_u8(&mut self, value: u8) {
		self.out.put_u8(value);
	}

	pub fn put_u16(&mut self, value: u16) {
		self.out.put_u16(value);
	}

	pub fn put_u40(&mut self, value: u64) {
		self.out.put_uint(value, 5);
	}

	pub fn put_address(&mut self, value: &Address) {
		self.out.put_slice(value.as_slice());
	}

	pub fn put_u256(&mut self, value: &U256) {
		self.out.put_slice(&value.to_be_bytes::<32>());
	}

	pub fn put_bytes(&mut self, value: &[u8]) {
		self.out.put_slice(value);
	}

	pub fn len(&self) -> usize {
		self.out.len()
	}

	pub fn is_empty(&self) -> bool {
		self.out.is_empty()
	}

	pub fn finish(self) -> Vec<u8> {
		self.out
	}
}
