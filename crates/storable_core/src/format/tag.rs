use crate::format::{Result, StorableError};

/// One-byte type marker preceding every value in a `Storable` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
	/// Back-reference to an already stored object.
	Object = 0,
	/// Byte string with a 32-bit length.
	LScalar = 1,
	/// Array body.
	Array = 2,
	/// Hash body.
	Hash = 3,
	/// Reference to the following value.
	Ref = 4,
	/// Fresh undefined scalar.
	Undef = 5,
	/// Native-width integer.
	Integer = 6,
	/// Native double.
	Double = 7,
	/// Small integer stored as `value + 128`.
	Byte = 8,
	/// Big-endian 32-bit integer.
	NetInt = 9,
	/// Byte string with an 8-bit length.
	Scalar = 10,
	/// Tied array.
	TiedArray = 11,
	/// Tied hash.
	TiedHash = 12,
	/// Tied scalar.
	TiedScalar = 13,
	/// Perl's immortal undef.
	SvUndef = 14,
	/// Perl's immortal true.
	SvYes = 15,
	/// Perl's immortal false.
	SvNo = 16,
	/// Class name followed by the blessed value.
	Bless = 17,
	/// Indexed class name followed by the blessed value.
	IxBless = 18,
	/// `STORABLE_freeze` hook output.
	Hook = 19,
	/// Reference to an overloaded object.
	Overload = 20,
	/// Tied hash element.
	TiedKey = 21,
	/// Tied array element.
	TiedIdx = 22,
	/// UTF-8 string with an 8-bit length.
	Utf8Str = 23,
	/// UTF-8 string with a 32-bit length.
	LUtf8Str = 24,
	/// Hash with hash-level and per-key flags.
	FlagHash = 25,
	/// Code reference carried as source text.
	Code = 26,
	/// Weak reference.
	WeakRef = 27,
	/// Weak reference to an overloaded object.
	WeakOverload = 28,
	/// V-string magic with an 8-bit length.
	VString = 29,
	/// V-string magic with a 32-bit length.
	LVString = 30,
	/// Nonexistent array element placeholder.
	SvUndefElem = 31,
	/// Compiled pattern.
	Regexp = 32,
	/// Large object with a 64-bit length.
	LObject = 33,
}

/// Payload layout following a tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
	/// No payload.
	Empty,
	/// 4-byte big-endian object index.
	ObjectIndex,
	/// One byte holding `value + 128`.
	Byte,
	/// 4-byte big-endian signed integer.
	NetInt,
	/// IV-width integer in native order.
	NativeInt,
	/// 8-byte double.
	Double,
	/// 1-byte length, then bytes.
	SmallString,
	/// `I32` length, then bytes.
	LargeString,
	/// `I32` count, then that many values.
	Array,
	/// `I32` count, then `(value, I32 key length, key)` triples.
	Hash,
	/// Flag byte, `I32` count, then `(value, flag byte, key)` triples.
	FlagHash,
	/// Exactly one nested value.
	Wrapped,
	/// Tie object value, then key value.
	TiedKey,
	/// Tie object value, then `I32` index.
	TiedIndex,
	/// Class length or `0x80` + `I32`, class bytes, then one value.
	Bless,
	/// Class index or `0x80` + `I32`, then one value.
	IndexedBless,
	/// Hook flags, optional recursion, class, frozen string, object list.
	Hook,
	/// String scalar holding the code source.
	Code,
	/// Small v-string magic, then a string scalar.
	SmallVString,
	/// Large v-string magic, then a string scalar.
	LargeVString,
	/// Op flags, pattern, flag string.
	Regexp,
	/// Inner tag byte and 64-bit length.
	LargeObject,
}

/// Catalog row describing one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagInfo {
	/// Tag value.
	pub tag: Tag,
	/// Name used by the Perl implementation, without the `SX_` prefix.
	pub name: &'static str,
	/// First binary minor (major 2) in which the tag may appear.
	pub since_minor: u8,
	/// Payload layout.
	pub shape: Shape,
	/// Whether decoding this tag assigns a new object index.
	pub owns_index: bool,
}

const fn row(tag: Tag, name: &'static str, since_minor: u8, shape: Shape, owns_index: bool) -> TagInfo {
	TagInfo {
		tag,
		name,
		since_minor,
		shape,
		owns_index,
	}
}

/// Complete tag catalog, indexed by tag byte.
pub const TAGS: [TagInfo; 34] = [
	row(Tag::Object, "OBJECT", 0, Shape::ObjectIndex, false),
	row(Tag::LScalar, "LSCALAR", 0, Shape::LargeString, true),
	row(Tag::Array, "ARRAY", 0, Shape::Array, true),
	row(Tag::Hash, "HASH", 0, Shape::Hash, true),
	row(Tag::Ref, "REF", 0, Shape::Wrapped, true),
	row(Tag::Undef, "UNDEF", 0, Shape::Empty, true),
	row(Tag::Integer, "INTEGER", 0, Shape::NativeInt, true),
	row(Tag::Double, "DOUBLE", 0, Shape::Double, true),
	row(Tag::Byte, "BYTE", 0, Shape::Byte, true),
	row(Tag::NetInt, "NETINT", 0, Shape::NetInt, true),
	row(Tag::Scalar, "SCALAR", 0, Shape::SmallString, true),
	row(Tag::TiedArray, "TIED_ARRAY", 0, Shape::Wrapped, true),
	row(Tag::TiedHash, "TIED_HASH", 0, Shape::Wrapped, true),
	row(Tag::TiedScalar, "TIED_SCALAR", 0, Shape::Wrapped, true),
	row(Tag::SvUndef, "SV_UNDEF", 0, Shape::Empty, true),
	row(Tag::SvYes, "SV_YES", 0, Shape::Empty, true),
	row(Tag::SvNo, "SV_NO", 0, Shape::Empty, true),
	row(Tag::Bless, "BLESS", 0, Shape::Bless, false),
	row(Tag::IxBless, "IX_BLESS", 0, Shape::IndexedBless, false),
	row(Tag::Hook, "HOOK", 0, Shape::Hook, true),
	row(Tag::Overload, "OVERLOAD", 0, Shape::Wrapped, true),
	row(Tag::TiedKey, "TIED_KEY", 0, Shape::TiedKey, true),
	row(Tag::TiedIdx, "TIED_IDX", 0, Shape::TiedIndex, true),
	row(Tag::Utf8Str, "UTF8STR", 4, Shape::SmallString, true),
	row(Tag::LUtf8Str, "LUTF8STR", 4, Shape::LargeString, true),
	row(Tag::FlagHash, "FLAG_HASH", 5, Shape::FlagHash, true),
	row(Tag::Code, "CODE", 6, Shape::Code, true),
	row(Tag::WeakRef, "WEAKREF", 7, Shape::Wrapped, true),
	row(Tag::WeakOverload, "WEAKOVERLOAD", 7, Shape::Wrapped, true),
	row(Tag::VString, "VSTRING", 8, Shape::SmallVString, false),
	row(Tag::LVString, "LVSTRING", 8, Shape::LargeVString, false),
	row(Tag::SvUndefElem, "SVUNDEF_ELEM", 9, Shape::Empty, true),
	row(Tag::Regexp, "REGEXP", 10, Shape::Regexp, true),
	row(Tag::LObject, "LOBJECT", 11, Shape::LargeObject, false),
];

/// Flag bits of the `HOOK` payload.
pub mod hook_flags {
	/// Mask selecting the object type.
	pub const TYPE_MASK: u8 = 0x03;
	/// Class name length (or index) is an `I32`.
	pub const LARGE_CLASSLEN: u8 = 0x04;
	/// Frozen string length is an `I32`.
	pub const LARGE_STRLEN: u8 = 0x08;
	/// Object list length is an `I32`.
	pub const LARGE_LISTLEN: u8 = 0x10;
	/// Class is given by index.
	pub const IDX_CLASSNAME: u8 = 0x20;
	/// Another object follows before the next flag byte.
	pub const NEED_RECURSE: u8 = 0x40;
	/// Object list present.
	pub const HAS_LIST: u8 = 0x80;

	/// Object type: scalar.
	pub const TYPE_SCALAR: u8 = 0;
	/// Object type: array.
	pub const TYPE_ARRAY: u8 = 1;
	/// Object type: hash.
	pub const TYPE_HASH: u8 = 2;
	/// Object type: see the extra byte.
	pub const TYPE_EXTRA: u8 = 3;

	/// Extra byte: tied scalar.
	pub const EXTRA_TIED_SCALAR: u8 = 4;
	/// Extra byte: tied array.
	pub const EXTRA_TIED_ARRAY: u8 = 5;
	/// Extra byte: tied hash.
	pub const EXTRA_TIED_HASH: u8 = 6;
}

/// `REGEXP` op flag: pattern length is an `I32` instead of one byte.
pub const REGEXP_LARGE_PATTERN: u8 = 0x01;

/// Class lengths and indices above this use the `0x80` + `I32` form.
pub const MAX_SHORT_CLASS: usize = 127;

/// Strings longer than this use the large string tags.
pub const MAX_SHORT_STRING: usize = 255;

impl Tag {
	/// Look up a tag byte, rejecting bytes outside the catalog or newer than `minor`.
	pub fn lookup(byte: u8, minor: u8, at: usize) -> Result<&'static TagInfo> {
		match TAGS.get(usize::from(byte)) {
			Some(info) if info.since_minor <= minor => Ok(info),
			_ => Err(StorableError::UnknownTag { tag: byte, at, minor }),
		}
	}

	/// Catalog row for this tag.
	pub fn info(self) -> &'static TagInfo {
		&TAGS[self as usize]
	}

	/// Catalog name, without the `SX_` prefix.
	pub fn name(self) -> &'static str {
		self.info().name
	}

	/// Raw tag byte.
	pub fn byte(self) -> u8 {
		self as u8
	}
}
