use crate::format::{Cursor, Endianness, IntWidth, Result, StorableError, Writer};

/// Magic prefix of file images written by `store`/`nstore`.
pub const MAGIC: [u8; 4] = *b"pst0";
/// Only supported binary major.
pub const MAJOR: u8 = 2;
/// Highest binary minor understood by this codec.
pub const MAX_MINOR: u8 = 11;

/// Whether an image carries the file magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
	/// `pst0` prefix, as written by `store`/`nstore`.
	File,
	/// No prefix, as produced by `freeze`/`nfreeze`.
	Memory,
}

impl Framing {
	/// Detect framing from the first bytes of an image.
	///
	/// The first byte of an unframed image is `(major << 1) | net`, which can never be `p`.
	pub fn detect(bytes: &[u8]) -> Self {
		if bytes.starts_with(&MAGIC) { Self::File } else { Self::Memory }
	}

	/// Stable lowercase label.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::File => "file",
			Self::Memory => "memory",
		}
	}
}

/// Integer width and byte order of the writing host, as recorded by its byte-order string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteOrder {
	/// IV width.
	pub width: IntWidth,
	/// Host byte order.
	pub endianness: Endianness,
}

impl ByteOrder {
	/// Byte-order string as written into the header.
	pub fn as_bytes(self) -> &'static [u8] {
		match (self.width, self.endianness) {
			(IntWidth::W32, Endianness::Little) => b"1234",
			(IntWidth::W64, Endianness::Little) => b"12345678",
			(IntWidth::W32, Endianness::Big) => b"4321",
			(IntWidth::W64, Endianness::Big) => b"87654321",
		}
	}

	fn parse(raw: &[u8]) -> Option<Self> {
		let (width, endianness) = match raw {
			b"1234" => (IntWidth::W32, Endianness::Little),
			b"12345678" => (IntWidth::W64, Endianness::Little),
			b"4321" => (IntWidth::W32, Endianness::Big),
			b"87654321" => (IntWidth::W64, Endianness::Big),
			_ => return None,
		};
		Some(Self { width, endianness })
	}
}

/// Architecture description carried by native-order headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeLayout {
	/// IV width and host byte order.
	pub byteorder: ByteOrder,
	/// `sizeof(int)` on the writing host.
	pub int_size: u8,
	/// `sizeof(long)` on the writing host.
	pub long_size: u8,
	/// `sizeof(char *)` on the writing host.
	pub ptr_size: u8,
}

const fn layout(width: IntWidth, endianness: Endianness, long_size: u8, ptr_size: u8) -> NativeLayout {
	NativeLayout {
		byteorder: ByteOrder { width, endianness },
		int_size: 4,
		long_size,
		ptr_size,
	}
}

impl NativeLayout {
	/// 64-bit little-endian Linux perl.
	pub const X86_64_LINUX: Self = layout(IntWidth::W64, Endianness::Little, 8, 8);
	/// 32-bit little-endian Linux perl.
	pub const I686_LINUX: Self = layout(IntWidth::W32, Endianness::Little, 4, 4);
	/// 32-bit little-endian Darwin perl.
	pub const I386_DARWIN: Self = layout(IntWidth::W32, Endianness::Little, 4, 4);
	/// 32-bit big-endian PowerPC Linux perl.
	pub const PPC_LINUX: Self = layout(IntWidth::W32, Endianness::Big, 4, 4);
	/// 64-bit big-endian PowerPC Linux perl.
	pub const PPC64_LINUX: Self = layout(IntWidth::W64, Endianness::Big, 8, 8);
	/// 32-bit big-endian SPARC Solaris perl.
	pub const SUN4_SOLARIS: Self = layout(IntWidth::W32, Endianness::Big, 4, 4);
	/// 32-bit Windows perl.
	pub const MSWIN32: Self = layout(IntWidth::W32, Endianness::Little, 4, 4);

	/// Layout of a 64-bit-IV perl built for the running host.
	pub fn host() -> Self {
		let ptr_size = std::mem::size_of::<usize>() as u8;
		let long_size = if cfg!(windows) { 4 } else { ptr_size };
		layout(IntWidth::W64, Endianness::host(), long_size, ptr_size)
	}
}

/// Body encoding mode selected by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
	/// Portable mode: big-endian lengths, no architecture block.
	Network,
	/// Host-dependent mode described by the architecture block.
	Native(NativeLayout),
}

/// Parsed image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	/// Binary major version.
	pub major: u8,
	/// Binary minor version; selects which tags are legal.
	pub minor: u8,
	/// Network or native body encoding.
	pub layout: Layout,
}

impl Header {
	/// Build a major-2 header.
	pub fn new(minor: u8, layout: Layout) -> Self {
		Self { major: MAJOR, minor, layout }
	}

	/// Parse a header from the cursor, consuming the `pst0` magic for file images.
	pub fn parse(cursor: &mut Cursor<'_>, framing: Framing) -> Result<Self> {
		if framing == Framing::File {
			let raw = cursor.read_exact(MAGIC.len().min(cursor.remaining()))?;
			if raw != MAGIC {
				let mut magic = [0_u8; 4];
				magic[..raw.len()].copy_from_slice(raw);
				return Err(StorableError::BadMagic { magic });
			}
		}

		let net_major = cursor.read_u8()?;
		let major = net_major >> 1;
		let network = net_major & 1 == 1;
		if framing == Framing::Memory && major != MAJOR {
			// Without the magic, a foreign version byte means this is not an image at all.
			let mut magic = [net_major, 0, 0, 0];
			let rest = cursor.read_exact(3.min(cursor.remaining()))?;
			magic[1..=rest.len()].copy_from_slice(rest);
			return Err(StorableError::BadMagic { magic });
		}
		if major != MAJOR {
			return Err(StorableError::UnsupportedVersion {
				major,
				minor: 0,
				max_minor: MAX_MINOR,
			});
		}

		let minor = cursor.read_u8()?;
		if minor > MAX_MINOR {
			return Err(StorableError::UnsupportedVersion {
				major,
				minor,
				max_minor: MAX_MINOR,
			});
		}

		if network {
			return Ok(Self::new(minor, Layout::Network));
		}

		let order_len = usize::from(cursor.read_u8()?);
		let raw_order = cursor.read_exact(order_len)?;
		let byteorder = ByteOrder::parse(raw_order).ok_or_else(|| StorableError::UnsupportedArchitecture {
			detail: format!("byte order {:?}", String::from_utf8_lossy(raw_order)),
		})?;

		let int_size = cursor.read_u8()?;
		let long_size = cursor.read_u8()?;
		let ptr_size = cursor.read_u8()?;
		if minor >= 2 {
			let nv_size = cursor.read_u8()?;
			if nv_size != 8 {
				return Err(StorableError::UnsupportedArchitecture {
					detail: format!("NV size {nv_size}"),
				});
			}
		}

		Ok(Self::new(
			minor,
			Layout::Native(NativeLayout {
				byteorder,
				int_size,
				long_size,
				ptr_size,
			}),
		))
	}

	/// Emit the header, including the `pst0` magic for file images.
	pub fn write(&self, writer: &mut Writer, framing: Framing) {
		if framing == Framing::File {
			writer.put_bytes(&MAGIC);
		}
		writer.put_u8((self.major << 1) | u8::from(self.is_network()));
		writer.put_u8(self.minor);

		if let Layout::Native(native) = self.layout {
			let order = native.byteorder.as_bytes();
			writer.put_u8(order.len() as u8);
			writer.put_bytes(order);
			writer.put_u8(native.int_size);
			writer.put_u8(native.long_size);
			writer.put_u8(native.ptr_size);
			if self.minor >= 2 {
				writer.put_u8(8);
			}
		}
	}

	/// Return `true` for portable network-order images.
	pub fn is_network(&self) -> bool {
		matches!(self.layout, Layout::Network)
	}

	/// Width of native `INTEGER` payloads.
	///
	/// Network images never carry them from Perl; the host's 64-bit width is used.
	pub fn int_width(&self) -> IntWidth {
		match self.layout {
			Layout::Network => IntWidth::W64,
			Layout::Native(native) => native.byteorder.width,
		}
	}

	/// Byte order of length fields.
	pub fn endianness(&self) -> Endianness {
		match self.layout {
			Layout::Network => Endianness::Big,
			Layout::Native(native) => native.byteorder.endianness,
		}
	}

	/// Byte order of `INTEGER` and `DOUBLE` payloads.
	///
	/// These are never byte-swapped in network mode and stay in host order.
	pub fn value_endianness(&self) -> Endianness {
		match self.layout {
			Layout::Network => Endianness::host(),
			Layout::Native(native) => native.byteorder.endianness,
		}
	}
}

#[cfg(test)]
mod tests;
