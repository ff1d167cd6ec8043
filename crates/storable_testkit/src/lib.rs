//! Shared test helpers for workspace crates.
//!
//! Images are assembled from raw bytes so the helpers never depend on the
//! codec under test.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Resolve the workspace root path.
pub fn workspace_root() -> PathBuf {
	let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
	manifest_dir
		.join("..")
		.join("..")
		.canonicalize()
		.unwrap_or_else(|_| manifest_dir.join("..").join(".."))
}

/// Resolve the workspace target directory.
pub fn target_dir() -> PathBuf {
	std::env::var_os("CARGO_TARGET_DIR")
		.map(PathBuf::from)
		.unwrap_or_else(|| workspace_root().join("target"))
}

/// Return a fresh path under `<target>/tmp/storable-tests` for one test file.
///
/// The parent directory is created; the file itself is not.
pub fn scratch_path(name: &str) -> PathBuf {
	static NEXT: AtomicUsize = AtomicUsize::new(0);

	let dir = target_dir().join("tmp").join("storable-tests");
	std::fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("create {}: {err}", dir.display()));
	let seq = NEXT.fetch_add(1, Ordering::Relaxed);
	dir.join(format!("{}-{seq}-{name}", std::process::id()))
}

/// Network-order header for binary 2.11 (`nfreeze` prefix).
pub const NETWORK_2_11: [u8; 2] = [0x05, 0x0b];

/// Native header written by a 64-bit x86_64 Linux perl, binary 2.11.
pub const X86_64_2_11: [u8; 15] = [0x04, 0x0b, 0x08, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', 0x04, 0x08, 0x08, 0x08];

/// Native header written by a 32-bit big-endian perl (ppc/sun4), binary 2.7.
pub const BIG32_2_7: [u8; 11] = [0x04, 0x07, 0x04, b'4', b'3', b'2', b'1', 0x04, 0x04, 0x04, 0x08];

/// Byte-level image builder.
///
/// ```
/// use storable_testkit::{Image, NETWORK_2_11};
///
/// let bytes = Image::with_header(&NETWORK_2_11).tag(0x08).u8(0x81).finish();
/// assert_eq!(bytes, [0x05, 0x0b, 0x08, 0x81]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Image {
	bytes: Vec<u8>,
}

impl Image {
	/// Start an image with the given header bytes.
	pub fn with_header(header: &[u8]) -> Self {
		Self { bytes: header.to_vec() }
	}

	/// Start a network-order 2.11 image.
	pub fn network() -> Self {
		Self::with_header(&NETWORK_2_11)
	}

	/// Start a native x86_64 2.11 image.
	pub fn x86_64() -> Self {
		Self::with_header(&X86_64_2_11)
	}

	/// Append a tag byte.
	pub fn tag(self, tag: u8) -> Self {
		self.u8(tag)
	}

	/// Append one raw byte.
	pub fn u8(mut self, byte: u8) -> Self {
		self.bytes.push(byte);
		self
	}

	/// Append raw bytes.
	pub fn raw(mut self, bytes: &[u8]) -> Self {
		self.bytes.extend_from_slice(bytes);
		self
	}

	/// Append a big-endian 32-bit value.
	pub fn be32(self, value: i32) -> Self {
		self.raw(&value.to_be_bytes())
	}

	/// Append a little-endian 32-bit value.
	pub fn le32(self, value: i32) -> Self {
		self.raw(&value.to_le_bytes())
	}

	/// Append a one-byte length followed by the bytes.
	pub fn short(self, bytes: &[u8]) -> Self {
		self.u8(bytes.len() as u8).raw(bytes)
	}

	/// Append a big-endian `I32` length followed by the bytes.
	pub fn long_be(self, bytes: &[u8]) -> Self {
		self.be32(bytes.len() as i32).raw(bytes)
	}

	/// Append a little-endian `I32` length followed by the bytes.
	pub fn long_le(self, bytes: &[u8]) -> Self {
		self.le32(bytes.len() as i32).raw(bytes)
	}

	/// Prefix the image with the `pst0` file magic.
	pub fn framed(self) -> Self {
		let mut bytes = b"pst0".to_vec();
		bytes.extend_from_slice(&self.bytes);
		Self { bytes }
	}

	/// Return the assembled bytes.
	pub fn finish(self) -> Vec<u8> {
		self.bytes
	}
}
