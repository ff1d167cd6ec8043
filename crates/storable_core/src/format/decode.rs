use std::collections::HashSet;

use crate::format::seen::{ClassTable, SeenTable};
use crate::format::tag::{MAX_SHORT_CLASS, REGEXP_LARGE_PATTERN, hook_flags};
use crate::format::value::key_flags;
use crate::format::{
	ClassName, CodeSource, Cursor, Endianness, Framing, Graph, Header, Hook, HookKind, Immortal, IntWidth, MapEntry, Mapping, NodeId, Result, StorableError, Tag, TieKind,
	Value,
};

/// Runtime limits for decoding untrusted images.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
	/// Ceiling for any single length prefix or element count.
	pub max_length: usize,
	/// Maximum value nesting depth.
	pub max_depth: u32,
}

impl Default for DecodeOptions {
	fn default() -> Self {
		Self {
			max_length: 512 * 1024 * 1024,
			max_depth: 1024,
		}
	}
}

/// Decoded image together with the header needed to re-encode it exactly.
#[derive(Debug, Clone)]
pub struct Thawed {
	/// Whether the image carried the `pst0` magic.
	pub framing: Framing,
	/// Parsed header.
	pub header: Header,
	/// Decoded object graph, rooted at the stored value.
	pub graph: Graph,
}

/// Decode an image produced by `freeze`, `nfreeze`, `store`, or `nstore`.
pub fn thaw(bytes: &[u8]) -> Result<Graph> {
	Ok(thaw_with(bytes, &DecodeOptions::default())?.graph)
}

/// Decode an image with explicit limits, keeping framing and header.
pub fn thaw_with(bytes: &[u8], opt: &DecodeOptions) -> Result<Thawed> {
	decode_image(bytes, Framing::detect(bytes), opt)
}

pub(crate) fn decode_image(bytes: &[u8], framing: Framing, opt: &DecodeOptions) -> Result<Thawed> {
	let mut cursor = Cursor::new(bytes);
	let header = Header::parse(&mut cursor, framing)?;

	let mut decoder = Decoder {
		cursor,
		header,
		opt,
		graph: Graph::new(),
		seen: SeenTable::default(),
		classes: ClassTable::default(),
	};
	let root = decoder.decode_value(None, 0)?;
	if decoder.cursor.remaining() > 0 {
		return Err(StorableError::TrailingBytes {
			at: decoder.cursor.pos(),
			rem: decoder.cursor.remaining(),
		});
	}

	let mut graph = decoder.graph;
	graph.set_root(root);
	Ok(Thawed { framing, header, graph })
}

/// Node reserved for a value whose payload is still being read.
///
/// `outer` is what containers store; it differs from `inner` only when a
/// class is pending and the value is wrapped in [`Value::Blessed`].
#[derive(Debug, Clone, Copy)]
struct Slot {
	outer: NodeId,
	inner: NodeId,
}

struct Decoder<'a, 'o> {
	cursor: Cursor<'a>,
	header: Header,
	opt: &'o DecodeOptions,
	graph: Graph,
	seen: SeenTable,
	classes: ClassTable,
}

impl Decoder<'_, '_> {
	fn decode_value(&mut self, class: Option<ClassName>, depth: u32) -> Result<NodeId> {
		if depth >= self.opt.max_depth {
			return Err(StorableError::DepthExceeded { max_depth: self.opt.max_depth });
		}

		let at = self.cursor.pos();
		let byte = self.cursor.read_u8()?;
		let tag = Tag::lookup(byte, self.header.minor, at)?.tag;
		self.decode_tagged(tag, at, class, depth)
	}

	fn decode_tagged(&mut self, tag: Tag, at: usize, class: Option<ClassName>, depth: u32) -> Result<NodeId> {
		match tag {
			Tag::Object => {
				if class.is_some() {
					return Err(unexpected(tag, at, "blessed value"));
				}
				let index = self.cursor.read_i32(Endianness::Big)?;
				self.seen.resolve(index as u32, at)
			}
			Tag::Undef => self.leaf(class, Value::Undefined),
			Tag::SvUndef => self.leaf(class, Value::Immortal(Immortal::Undef)),
			Tag::SvYes => self.leaf(class, Value::Immortal(Immortal::Yes)),
			Tag::SvNo => self.leaf(class, Value::Immortal(Immortal::No)),
			Tag::SvUndefElem => self.leaf(class, Value::Immortal(Immortal::UndefElem)),
			Tag::Byte => {
				let raw = self.cursor.read_u8()?;
				self.leaf(class, Value::Integer(i64::from(raw) - 128))
			}
			Tag::NetInt => {
				let value = self.cursor.read_int(IntWidth::W32, Endianness::Big)?;
				self.leaf(class, Value::Integer(value))
			}
			Tag::Integer => {
				let value = self.cursor.read_int(self.header.int_width(), self.header.value_endianness())?;
				self.leaf(class, Value::Integer(value))
			}
			Tag::Double => {
				let value = self.cursor.read_double(self.header.value_endianness())?;
				self.leaf(class, Value::Double(value))
			}
			Tag::Scalar | Tag::LScalar | Tag::Utf8Str | Tag::LUtf8Str => {
				let (bytes, utf8) = self.read_string(tag)?;
				self.leaf(class, string_value(bytes, utf8))
			}
			Tag::Array => {
				let len = self.read_count()?;
				let slot = self.reserve(class);
				self.decode_array_body(slot, len, depth)
			}
			Tag::Hash => {
				let len = self.read_count()?;
				let slot = self.reserve(class);
				self.decode_hash_body(slot, len, None, depth)
			}
			Tag::FlagHash => {
				let hash_flags = self.cursor.read_u8()?;
				let len = self.read_count()?;
				let slot = self.reserve(class);
				self.decode_hash_body(slot, len, Some(hash_flags), depth)
			}
			Tag::Ref | Tag::WeakRef | Tag::Overload | Tag::WeakOverload => {
				let slot = self.reserve(class);
				let target = self.decode_value(None, depth + 1)?;
				let value = match tag {
					Tag::Ref => Value::Reference(target),
					Tag::WeakRef => Value::WeakReference(target),
					Tag::Overload => Value::Overloaded(target),
					_ => Value::WeakOverloaded(target),
				};
				self.finish(slot, value)
			}
			Tag::TiedArray | Tag::TiedHash | Tag::TiedScalar => {
				let slot = self.reserve(class);
				let object = self.decode_value(None, depth + 1)?;
				let kind = match tag {
					Tag::TiedArray => TieKind::Array,
					Tag::TiedHash => TieKind::Hash,
					_ => TieKind::Scalar,
				};
				self.finish(slot, Value::Tied { kind, object })
			}
			Tag::TiedKey => {
				let slot = self.reserve(class);
				let object = self.decode_value(None, depth + 1)?;
				let key = self.decode_value(None, depth + 1)?;
				self.finish(
					slot,
					Value::Tied {
						kind: TieKind::Key(key),
						object,
					},
				)
			}
			Tag::TiedIdx => {
				let slot = self.reserve(class);
				let object = self.decode_value(None, depth + 1)?;
				let index = self.cursor.read_i32(self.header.endianness())?;
				self.finish(
					slot,
					Value::Tied {
						kind: TieKind::Index(index),
						object,
					},
				)
			}
			Tag::Bless | Tag::IxBless => {
				if class.is_some() {
					return Err(unexpected(tag, at, "blessed value"));
				}
				let class = if tag == Tag::Bless { self.read_new_class()? } else { self.read_class_index()? };
				self.decode_value(Some(class), depth + 1)
			}
			Tag::Hook => {
				if class.is_some() {
					return Err(unexpected(tag, at, "blessed value"));
				}
				self.decode_hook(at, depth)
			}
			Tag::Code => {
				let slot = self.reserve(class);
				let text_at = self.cursor.pos();
				let text_tag = self.read_tag()?;
				if !is_string_tag(text_tag) {
					return Err(unexpected(text_tag, text_at, "code source"));
				}
				let (text, utf8) = self.read_string(text_tag)?;
				self.seen.record(None);
				self.finish(slot, Value::CodeRef(Some(CodeSource { text, utf8 })))
			}
			Tag::VString | Tag::LVString => {
				let magic = self
					.cursor
					.read_length_prefixed(tag == Tag::VString, self.header.endianness(), self.opt.max_length)?
					.to_vec();
				let inner_at = self.cursor.pos();
				let inner_tag = self.read_tag()?;
				if !is_string_tag(inner_tag) {
					return Err(unexpected(inner_tag, inner_at, "v-string value"));
				}
				let (string, utf8) = self.read_string(inner_tag)?;
				self.leaf(class, Value::VString { magic, string, utf8 })
			}
			Tag::Regexp => {
				let op_flags = self.cursor.read_u8()?;
				let large = op_flags & REGEXP_LARGE_PATTERN != 0;
				let pattern = self.cursor.read_length_prefixed(!large, self.header.endianness(), self.opt.max_length)?.to_vec();
				let flags = self.cursor.read_length_prefixed(true, self.header.endianness(), self.opt.max_length)?.to_vec();
				self.leaf(class, Value::Regexp { pattern, flags })
			}
			Tag::LObject => self.decode_large_object(class, depth),
		}
	}

	fn decode_large_object(&mut self, class: Option<ClassName>, depth: u32) -> Result<NodeId> {
		let inner_at = self.cursor.pos();
		let inner = self.read_tag()?;
		let hash_flags = if inner == Tag::FlagHash { Some(self.cursor.read_u8()?) } else { None };
		let len = self.cursor.read_len64(self.header.endianness(), self.opt.max_length)?;

		match inner {
			Tag::LScalar | Tag::LUtf8Str => {
				let bytes = self.cursor.read_exact(len)?.to_vec();
				self.leaf(class, string_value(bytes, inner == Tag::LUtf8Str))
			}
			Tag::Array => {
				let slot = self.reserve(class);
				self.decode_array_body(slot, len, depth)
			}
			Tag::Hash | Tag::FlagHash => {
				let slot = self.reserve(class);
				self.decode_hash_body(slot, len, hash_flags, depth)
			}
			_ => Err(unexpected(inner, inner_at, "large object")),
		}
	}

	fn decode_array_body(&mut self, slot: Slot, len: usize, depth: u32) -> Result<NodeId> {
		let mut items = Vec::with_capacity(len.min(self.cursor.remaining()));
		for _ in 0..len {
			items.push(self.decode_value(None, depth + 1)?);
		}
		self.finish(slot, Value::Sequence(items))
	}

	fn decode_hash_body(&mut self, slot: Slot, len: usize, hash_flags: Option<u8>, depth: u32) -> Result<NodeId> {
		let mut entries = Vec::with_capacity(len.min(self.cursor.remaining()));
		let mut keys = HashSet::with_capacity(len.min(self.cursor.remaining()));

		for _ in 0..len {
			let value = self.decode_value(None, depth + 1)?;
			let flags = if hash_flags.is_some() { self.cursor.read_u8()? } else { 0 };
			let key_at = self.cursor.pos();
			let key = if flags & key_flags::IS_SV != 0 {
				let key_node = self.decode_value(None, depth + 1)?;
				self.key_bytes(key_node, key_at)?
			} else {
				self.cursor.read_length_prefixed(false, self.header.endianness(), self.opt.max_length)?.to_vec()
			};

			if !keys.insert(key.clone()) {
				return Err(StorableError::DuplicateMappingKey {
					key: String::from_utf8_lossy(&key).into_owned(),
					at: key_at,
				});
			}
			entries.push(MapEntry { key, value, flags });
		}

		self.finish(slot, Value::Mapping(Mapping { entries, hash_flags }))
	}

	fn decode_hook(&mut self, at: usize, depth: u32) -> Result<NodeId> {
		let mut flags = self.cursor.read_u8()?;
		let kind = match flags & hook_flags::TYPE_MASK {
			hook_flags::TYPE_SCALAR => HookKind::Scalar,
			hook_flags::TYPE_ARRAY => HookKind::Array,
			hook_flags::TYPE_HASH => HookKind::Hash,
			_ => match self.cursor.read_u8()? {
				hook_flags::EXTRA_TIED_SCALAR => HookKind::TiedScalar,
				hook_flags::EXTRA_TIED_ARRAY => HookKind::TiedArray,
				hook_flags::EXTRA_TIED_HASH => HookKind::TiedHash,
				_ => return Err(unexpected(Tag::Hook, at, "hook tie type")),
			},
		};
		let slot = self.reserve(None);

		while flags & hook_flags::NEED_RECURSE != 0 {
			self.decode_value(None, depth + 1)?;
			flags = self.cursor.read_u8()?;
		}

		let large_class = flags & hook_flags::LARGE_CLASSLEN != 0;
		let class = if flags & hook_flags::IDX_CLASSNAME != 0 {
			let idx_at = self.cursor.pos();
			let idx = self.read_short_or_len(large_class)?;
			self.classes.get(idx as u32, idx_at)?.clone()
		} else {
			let len = self.read_short_or_len(large_class)?;
			let class = ClassName::from_bytes(self.cursor.read_exact(len)?);
			self.classes.register(class.clone());
			class
		};

		let frozen_len = self.read_short_or_len(flags & hook_flags::LARGE_STRLEN != 0)?;
		let frozen = self.cursor.read_exact(frozen_len)?.to_vec();

		let mut refs = Vec::new();
		if flags & hook_flags::HAS_LIST != 0 {
			let count = self.read_short_or_len(flags & hook_flags::LARGE_LISTLEN != 0)?;
			refs.reserve(count.min(self.cursor.remaining()));
			for _ in 0..count {
				let tag_at = self.cursor.pos();
				let index = self.cursor.read_i32(Endianness::Big)?;
				refs.push(self.seen.resolve(index as u32, tag_at)?);
			}
		}

		let tied = if kind.is_tied() { Some(self.decode_value(None, depth + 1)?) } else { None };
		self.finish(
			slot,
			Value::Hook(Hook {
				class,
				kind,
				frozen,
				refs,
				tied,
			}),
		)
	}

	fn reserve(&mut self, class: Option<ClassName>) -> Slot {
		let inner = self.graph.add(Value::Undefined);
		let outer = match class {
			Some(class) => self.graph.add(Value::Blessed { class, inner }),
			None => inner,
		};
		self.seen.record(Some(outer));
		Slot { outer, inner }
	}

	fn finish(&mut self, slot: Slot, value: Value) -> Result<NodeId> {
		self.graph.set(slot.inner, value)?;
		Ok(slot.outer)
	}

	fn leaf(&mut self, class: Option<ClassName>, value: Value) -> Result<NodeId> {
		let slot = self.reserve(class);
		self.finish(slot, value)
	}

	fn read_tag(&mut self) -> Result<Tag> {
		let at = self.cursor.pos();
		let byte = self.cursor.read_u8()?;
		Ok(Tag::lookup(byte, self.header.minor, at)?.tag)
	}

	fn read_count(&mut self) -> Result<usize> {
		self.cursor.read_len(self.header.endianness(), self.opt.max_length)
	}

	fn read_short_or_len(&mut self, large: bool) -> Result<usize> {
		if large {
			self.read_count()
		} else {
			Ok(usize::from(self.cursor.read_u8()?))
		}
	}

	fn read_string(&mut self, tag: Tag) -> Result<(Vec<u8>, bool)> {
		let small = matches!(tag, Tag::Scalar | Tag::Utf8Str);
		let utf8 = matches!(tag, Tag::Utf8Str | Tag::LUtf8Str);
		let bytes = self.cursor.read_length_prefixed(small, self.header.endianness(), self.opt.max_length)?;
		Ok((bytes.to_vec(), utf8))
	}

	fn read_new_class(&mut self) -> Result<ClassName> {
		let len = self.read_class_field()?;
		let class = ClassName::from_bytes(self.cursor.read_exact(len)?);
		self.classes.register(class.clone());
		Ok(class)
	}

	fn read_class_index(&mut self) -> Result<ClassName> {
		let at = self.cursor.pos();
		let idx = self.read_class_field()?;
		Ok(self.classes.get(idx as u32, at)?.clone())
	}

	/// Class length or index: one byte up to 127, otherwise `0x80` and an `I32`.
	fn read_class_field(&mut self) -> Result<usize> {
		let short = self.cursor.read_u8()?;
		if usize::from(short) <= MAX_SHORT_CLASS {
			return Ok(usize::from(short));
		}
		self.read_count()
	}

	fn key_bytes(&self, node: NodeId, at: usize) -> Result<Vec<u8>> {
		match self.graph.node(node)? {
			Value::ByteString(bytes) | Value::TextString(bytes) => Ok(bytes.clone()),
			other => Err(StorableError::UnexpectedTag {
				tag: other.kind(),
				at,
				context: "hash key",
			}),
		}
	}
}

fn is_string_tag(tag: Tag) -> bool {
	matches!(tag, Tag::Scalar | Tag::LScalar | Tag::Utf8Str | Tag::LUtf8Str)
}

fn string_value(bytes: Vec<u8>, utf8: bool) -> Value {
	if utf8 { Value::TextString(bytes) } else { Value::ByteString(bytes) }
}

fn unexpected(tag: Tag, at: usize, context: &'static str) -> StorableError {
	StorableError::UnexpectedTag {
		tag: tag.name(),
		at,
		context,
	}
}

#[cfg(test)]
mod tests;
