use crate::format::{Result, StorableError};

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
	/// Least significant byte first.
	Little,
	/// Most significant byte first.
	Big,
}

impl Endianness {
	/// Byte order of the running host.
	pub const fn host() -> Self {
		if cfg!(target_endian = "big") { Self::Big } else { Self::Little }
	}

	/// Stable lowercase label.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Little => "little",
			Self::Big => "big",
		}
	}
}

/// Width of a fixed-size integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
	/// 32-bit field.
	W32,
	/// 64-bit field.
	W64,
}

impl IntWidth {
	/// Field size in bytes.
	pub fn bytes(self) -> usize {
		match self {
			Self::W32 => 4,
			Self::W64 => 8,
		}
	}

	/// Whether `value` survives a round trip through this width.
	pub fn fits(self, value: i64) -> bool {
		match self {
			Self::W32 => i32::try_from(value).is_ok(),
			Self::W64 => true,
		}
	}
}

/// Simple bounded cursor over an immutable byte slice.
pub struct Cursor<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	/// Create a cursor at position 0.
	pub fn new(bytes: &'a [u8]) -> Self {
		Self { bytes, pos: 0 }
	}

	/// Return current byte offset.
	pub fn pos(&self) -> usize {
		self.pos
	}

	/// Return remaining unread bytes.
	pub fn remaining(&self) -> usize {
		self.bytes.len().saturating_sub(self.pos)
	}

	/// Read exactly `n` bytes and advance cursor.
	pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
		if n > self.remaining() {
			return Err(StorableError::Truncated {
				at: self.pos,
				need: n,
				rem: self.remaining(),
			});
		}

		let start = self.pos;
		self.pos += n;
		Ok(&self.bytes[start..self.pos])
	}

	fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
		let raw = self.read_exact(N)?;
		let mut buf = [0_u8; N];
		buf.copy_from_slice(raw);
		Ok(buf)
	}

	/// Read one byte.
	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.read_array::<1>()?[0])
	}

	/// Read an `i32` using the selected endianness.
	pub fn read_i32(&mut self, endianness: Endianness) -> Result<i32> {
		let buf = self.read_array::<4>()?;
		Ok(match endianness {
			Endianness::Little => i32::from_le_bytes(buf),
			Endianness::Big => i32::from_be_bytes(buf),
		})
	}

	/// Read a `u64` using the selected endianness.
	pub fn read_u64(&mut self, endianness: Endianness) -> Result<u64> {
		let buf = self.read_array::<8>()?;
		Ok(match endianness {
			Endianness::Little => u64::from_le_bytes(buf),
			Endianness::Big => u64::from_be_bytes(buf),
		})
	}

	/// Read a signed integer of `width`, sign-extended to `i64`.
	pub fn read_int(&mut self, width: IntWidth, endianness: Endianness) -> Result<i64> {
		match width {
			IntWidth::W32 => Ok(i64::from(self.read_i32(endianness)?)),
			IntWidth::W64 => Ok(self.read_u64(endianness)? as i64),
		}
	}

	/// Read an 8-byte IEEE-754 double in the given byte order.
	pub fn read_double(&mut self, endianness: Endianness) -> Result<f64> {
		let buf = self.read_array::<8>()?;
		Ok(match endianness {
			Endianness::Little => f64::from_le_bytes(buf),
			Endianness::Big => f64::from_be_bytes(buf),
		})
	}

	/// Read an `I32` length field, rejecting negative values and values above `max`.
	pub fn read_len(&mut self, endianness: Endianness, max: usize) -> Result<usize> {
		let at = self.pos;
		let len = self.read_i32(endianness)?;
		checked_len(i64::from(len), at, max)
	}

	/// Read a 64-bit length field, rejecting values above `max`.
	pub fn read_len64(&mut self, endianness: Endianness, max: usize) -> Result<usize> {
		let at = self.pos;
		let len = self.read_u64(endianness)?;
		checked_len(i64::try_from(len).unwrap_or(i64::MAX), at, max)
	}

	/// Read a length field followed by that many raw bytes.
	///
	/// Small fields use a single length byte; large ones an `I32`.
	pub fn read_length_prefixed(&mut self, small: bool, endianness: Endianness, max: usize) -> Result<&'a [u8]> {
		let len = if small {
			usize::from(self.read_u8()?)
		} else {
			self.read_len(endianness, max)?
		};
		self.read_exact(len)
	}
}

fn checked_len(len: i64, at: usize, max: usize) -> Result<usize> {
	match usize::try_from(len) {
		Ok(len) if len <= max => Ok(len),
		_ => Err(StorableError::LengthOutOfRange { len, at, max }),
	}
}

/// Growable output buffer with the writer-side primitive encodings.
#[derive(Debug, Default)]
pub struct Writer {
	buf: Vec<u8>,
}

impl Writer {
	/// Create an empty writer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of bytes written so far.
	pub fn len(&self) -> usize {
		self.buf.len()
	}

	/// Return `true` when nothing has been written.
	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	/// Consume the writer and return the written bytes.
	pub fn into_bytes(self) -> Vec<u8> {
		self.buf
	}

	/// Append one byte.
	pub fn put_u8(&mut self, byte: u8) {
		self.buf.push(byte);
	}

	/// Append raw bytes.
	pub fn put_bytes(&mut self, bytes: &[u8]) {
		self.buf.extend_from_slice(bytes);
	}

	/// Append a signed integer of `width` in the given byte order.
	///
	/// Values wider than `width` are truncated; callers check [`IntWidth::fits`] first.
	pub fn put_int(&mut self, value: i64, width: IntWidth, endianness: Endianness) {
		match (width, endianness) {
			(IntWidth::W32, Endianness::Little) => self.put_bytes(&(value as i32).to_le_bytes()),
			(IntWidth::W32, Endianness::Big) => self.put_bytes(&(value as i32).to_be_bytes()),
			(IntWidth::W64, Endianness::Little) => self.put_bytes(&value.to_le_bytes()),
			(IntWidth::W64, Endianness::Big) => self.put_bytes(&value.to_be_bytes()),
		}
	}

	/// Append an unsigned 64-bit integer.
	pub fn put_u64(&mut self, value: u64, endianness: Endianness) {
		match endianness {
			Endianness::Little => self.put_bytes(&value.to_le_bytes()),
			Endianness::Big => self.put_bytes(&value.to_be_bytes()),
		}
	}

	/// Append an 8-byte double.
	pub fn put_double(&mut self, value: f64, endianness: Endianness) {
		match endianness {
			Endianness::Little => self.put_bytes(&value.to_le_bytes()),
			Endianness::Big => self.put_bytes(&value.to_be_bytes()),
		}
	}

	/// Append an `I32` length field.
	pub fn put_len(&mut self, len: usize, endianness: Endianness) -> Result<()> {
		let len = i32::try_from(len).map_err(|_| StorableError::LengthOutOfRange {
			len: i64::try_from(len).unwrap_or(i64::MAX),
			at: 0,
			max: i32::MAX as usize,
		})?;
		self.put_int(i64::from(len), IntWidth::W32, endianness);
		Ok(())
	}
}
