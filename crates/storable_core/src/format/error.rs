use thiserror::Error;

/// Crate-local result type.
pub type Result<T> = std::result::Result<T, StorableError>;

/// Errors produced while reading or writing `Storable` images.
#[derive(Debug, Error)]
pub enum StorableError {
	/// Filesystem or stream IO failure.
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	/// Image did not start with the `pst0` magic or a major-2 version byte.
	#[error("not a Storable image (magic={magic:?})")]
	BadMagic {
		/// First up-to-4 bytes of the stream.
		magic: [u8; 4],
	},
	/// Binary major/minor pair is newer than this reader or otherwise unknown.
	#[error("unsupported Storable binary version {major}.{minor} (max 2.{max_minor})")]
	UnsupportedVersion {
		/// Parsed major version.
		major: u8,
		/// Parsed minor version.
		minor: u8,
		/// Highest minor understood for major 2.
		max_minor: u8,
	},
	/// Native header describes an architecture this codec cannot represent.
	#[error("unsupported architecture: {detail}")]
	UnsupportedArchitecture {
		/// Human-readable description of the offending header field.
		detail: String,
	},
	/// Not enough bytes remained for a requested read.
	#[error("truncated input at offset {at}, need {need} bytes, remaining {rem}")]
	Truncated {
		/// Byte offset where the read was attempted.
		at: usize,
		/// Requested bytes.
		need: usize,
		/// Bytes still available.
		rem: usize,
	},
	/// Tag byte is not in the catalog for the active binary minor.
	#[error("unknown tag 0x{tag:02x} at offset {at} (binary minor {minor})")]
	UnknownTag {
		/// Offending tag byte.
		tag: u8,
		/// Offset of the tag byte.
		at: usize,
		/// Binary minor of the stream being decoded.
		minor: u8,
	},
	/// Tag is known but not allowed in this position.
	#[error("unexpected tag {tag} at offset {at} in {context}")]
	UnexpectedTag {
		/// Catalog name of the tag.
		tag: &'static str,
		/// Offset of the tag byte.
		at: usize,
		/// What the decoder was reading.
		context: &'static str,
	},
	/// Back-reference points at an object index that was never assigned.
	#[error("invalid back-reference to object #{index} at offset {at} ({seen} objects seen)")]
	InvalidBackReference {
		/// Referenced object index.
		index: u32,
		/// Offset of the reference.
		at: usize,
		/// Number of object indices assigned so far.
		seen: usize,
	},
	/// Indexed class name refers to a class that was never declared.
	#[error("invalid class index {index} at offset {at} ({known} classes known)")]
	InvalidClassIndex {
		/// Referenced class index.
		index: u32,
		/// Offset of the index field.
		at: usize,
		/// Number of class names registered so far.
		known: usize,
	},
	/// Mapping contains the same key twice.
	#[error("duplicate mapping key {key:?} at offset {at}")]
	DuplicateMappingKey {
		/// Lossy rendering of the key bytes.
		key: String,
		/// Offset of the key (0 while encoding).
		at: usize,
	},
	/// Length prefix or count is negative or above the configured ceiling.
	#[error("length {len} at offset {at} out of range (max {max})")]
	LengthOutOfRange {
		/// Declared length.
		len: i64,
		/// Offset of the length field (0 while encoding).
		at: usize,
		/// Configured ceiling.
		max: usize,
	},
	/// Nesting exceeded the configured depth ceiling.
	#[error("nesting depth exceeded (max={max_depth})")]
	DepthExceeded {
		/// Configured depth ceiling.
		max_depth: u32,
	},
	/// Bytes remained after a complete root value.
	#[error("{rem} trailing bytes after root value at offset {at}")]
	TrailingBytes {
		/// Offset just past the root value.
		at: usize,
		/// Unconsumed bytes.
		rem: usize,
	},
	/// Graph references a node id that does not exist.
	#[error("graph has no node #{id}")]
	InvalidNode {
		/// Missing node id.
		id: u32,
	},
	/// Value has no faithful encoding for the requested target.
	#[error("unsupported operation: {what}")]
	UnsupportedOperation {
		/// Description of the construct that could not be encoded.
		what: String,
	},
}
