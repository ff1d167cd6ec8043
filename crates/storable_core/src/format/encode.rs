use crate::format::seen::{ClassTable, TagTable};
use crate::format::tag::{MAX_SHORT_CLASS, MAX_SHORT_STRING, REGEXP_LARGE_PATTERN, hook_flags};
use crate::format::value::key_flags;
use crate::format::{
	ClassName, Endianness, Framing, Graph, Header, Hook, HookKind, Immortal, IntWidth, Layout, MAX_MINOR, MapEntry, Mapping, NativeLayout, NodeId, Result, StorableError, Tag, TieKind,
	Value, Writer,
};

/// Target layout and behavior for encoding.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
	/// Network or native body encoding.
	pub layout: Layout,
	/// Binary minor written into the header; newer tags are refused.
	pub minor: u8,
	/// Whether to prefix the image with the `pst0` magic.
	pub framing: Framing,
	/// Write hash entries sorted by key bytes.
	pub canonical: bool,
	/// Maximum value nesting depth.
	pub max_depth: u32,
}

impl EncodeOptions {
	/// Options matching `freeze` (native) or `nfreeze` (network) on a 64-bit-IV host perl.
	pub fn host(network: bool) -> Self {
		let layout = if network { Layout::Network } else { Layout::Native(NativeLayout::host()) };
		Self {
			layout,
			minor: MAX_MINOR,
			framing: Framing::Memory,
			canonical: false,
			max_depth: 1024,
		}
	}

	/// Options reproducing an existing header.
	pub fn for_header(header: &Header, framing: Framing) -> Self {
		Self {
			layout: header.layout,
			minor: header.minor,
			framing,
			..Self::host(header.is_network())
		}
	}
}

impl Default for EncodeOptions {
	fn default() -> Self {
		Self::host(false)
	}
}

/// Encode a graph the way `freeze` (or `nfreeze` with `network_order`) does on the running host.
pub fn freeze(graph: &Graph, network_order: bool) -> Result<Vec<u8>> {
	freeze_with(graph, &EncodeOptions::host(network_order))
}

/// Encode a graph with explicit target options.
pub fn freeze_with(graph: &Graph, opt: &EncodeOptions) -> Result<Vec<u8>> {
	if opt.minor > MAX_MINOR {
		return Err(StorableError::UnsupportedVersion {
			major: 2,
			minor: opt.minor,
			max_minor: MAX_MINOR,
		});
	}
	let root = graph.root().ok_or_else(|| StorableError::UnsupportedOperation {
		what: "graph has no root".to_owned(),
	})?;

	let header = Header::new(opt.minor, opt.layout);
	let mut encoder = Encoder {
		graph,
		opt,
		header,
		out: Writer::new(),
		tags: TagTable::default(),
		classes: ClassTable::default(),
	};
	header.write(&mut encoder.out, opt.framing);
	encoder.encode_node(root, 0)?;
	Ok(encoder.out.into_bytes())
}

struct Encoder<'g, 'o> {
	graph: &'g Graph,
	opt: &'o EncodeOptions,
	header: Header,
	out: Writer,
	tags: TagTable,
	classes: ClassTable,
}

impl<'g> Encoder<'g, '_> {
	fn encode_node(&mut self, id: NodeId, depth: u32) -> Result<()> {
		if depth >= self.opt.max_depth {
			return Err(StorableError::DepthExceeded { max_depth: self.opt.max_depth });
		}

		let graph = self.graph;
		let value = graph.node(id)?;
		if matches!(value, Value::Immortal(Immortal::Undef)) {
			// Written fresh every time; the index is still consumed.
			self.tags.skip();
			self.put_tag(Tag::SvUndef)?;
			return Ok(());
		}
		if let Some(tag) = self.tags.lookup(id) {
			self.refuse_alias(id)?;
			self.put_tag(Tag::Object)?;
			self.out.put_int(i64::from(tag), IntWidth::W32, Endianness::Big);
			return Ok(());
		}

		let tag = self.tags.assign(id);
		match value {
			Value::Blessed { class, inner } => {
				let inner_value = graph.node(*inner)?;
				if matches!(inner_value, Value::Blessed { .. } | Value::Hook(_) | Value::Immortal(_)) {
					return Err(StorableError::UnsupportedOperation {
						what: format!("cannot bless a {} value", inner_value.kind()),
					});
				}
				if self.tags.lookup(*inner).is_some() {
					return Err(StorableError::UnsupportedOperation {
						what: format!("blessed node {inner} was already stored unblessed"),
					});
				}
				self.tags.alias(*inner, tag);
				self.put_bless(class)?;
				self.encode_payload(inner_value, depth + 1)
			}
			Value::Hook(hook) => self.encode_hook(hook, depth),
			other => self.encode_payload(other, depth),
		}
	}

	/// Body of a value whose object index has already been assigned.
	fn encode_payload(&mut self, value: &'g Value, depth: u32) -> Result<()> {
		match value {
			Value::Undefined => self.put_tag(Tag::Undef),
			Value::Immortal(Immortal::Undef) => self.put_tag(Tag::SvUndef),
			Value::Immortal(Immortal::Yes) => self.put_tag(Tag::SvYes),
			Value::Immortal(Immortal::No) => self.put_tag(Tag::SvNo),
			Value::Immortal(Immortal::UndefElem) => self.put_tag(Tag::SvUndefElem),
			Value::Integer(value) => self.put_integer(*value),
			Value::Double(value) => {
				self.put_tag(Tag::Double)?;
				self.out.put_double(*value, self.header.value_endianness());
				Ok(())
			}
			Value::ByteString(bytes) => self.put_string(bytes, false),
			Value::TextString(bytes) => self.put_string(bytes, true),
			Value::VString { magic, string, utf8 } => {
				if magic.len() <= MAX_SHORT_STRING {
					self.put_tag(Tag::VString)?;
					self.out.put_u8(magic.len() as u8);
				} else {
					self.put_tag(Tag::LVString)?;
					self.out.put_len(magic.len(), self.header.endianness())?;
				}
				self.out.put_bytes(magic);
				self.put_string(string, *utf8)
			}
			Value::Sequence(items) => {
				self.put_container_len(Tag::Array, None, items.len())?;
				for item in items {
					self.encode_node(*item, depth + 1)?;
				}
				Ok(())
			}
			Value::Mapping(map) => self.encode_mapping(map, depth),
			Value::Reference(target) => self.encode_wrapped(Tag::Ref, *target, depth),
			Value::WeakReference(target) => self.encode_wrapped(Tag::WeakRef, *target, depth),
			Value::Overloaded(target) => self.encode_wrapped(Tag::Overload, *target, depth),
			Value::WeakOverloaded(target) => self.encode_wrapped(Tag::WeakOverload, *target, depth),
			Value::Tied { kind, object } => match kind {
				TieKind::Array => self.encode_wrapped(Tag::TiedArray, *object, depth),
				TieKind::Hash => self.encode_wrapped(Tag::TiedHash, *object, depth),
				TieKind::Scalar => self.encode_wrapped(Tag::TiedScalar, *object, depth),
				TieKind::Key(key) => {
					self.encode_wrapped(Tag::TiedKey, *object, depth)?;
					self.encode_node(*key, depth + 1)
				}
				TieKind::Index(index) => {
					self.encode_wrapped(Tag::TiedIdx, *object, depth)?;
					self.out.put_int(i64::from(*index), IntWidth::W32, self.header.endianness());
					Ok(())
				}
			},
			Value::CodeRef(Some(source)) => {
				self.put_tag(Tag::Code)?;
				self.tags.skip();
				self.put_string(&source.text, source.utf8)
			}
			Value::CodeRef(None) => Err(StorableError::UnsupportedOperation {
				what: "code reference without source text".to_owned(),
			}),
			Value::Regexp { pattern, flags } => {
				self.put_tag(Tag::Regexp)?;
				if pattern.len() <= MAX_SHORT_STRING {
					self.out.put_u8(0);
					self.out.put_u8(pattern.len() as u8);
				} else {
					self.out.put_u8(REGEXP_LARGE_PATTERN);
					self.out.put_len(pattern.len(), self.header.endianness())?;
				}
				self.out.put_bytes(pattern);
				self.put_short_len(flags.len())?;
				self.out.put_bytes(flags);
				Ok(())
			}
			Value::Blessed { .. } | Value::Hook(_) => Err(StorableError::UnsupportedOperation {
				what: format!("{} value cannot be stored here", value.kind()),
			}),
		}
	}

	fn encode_wrapped(&mut self, tag: Tag, target: NodeId, depth: u32) -> Result<()> {
		self.put_tag(tag)?;
		self.encode_node(target, depth + 1)
	}

	fn encode_mapping(&mut self, map: &'g Mapping, depth: u32) -> Result<()> {
		if let Some(key) = map.duplicate_key() {
			return Err(StorableError::DuplicateMappingKey {
				key: String::from_utf8_lossy(key).into_owned(),
				at: 0,
			});
		}

		let mut entries: Vec<&MapEntry> = map.entries.iter().collect();
		if self.opt.canonical {
			entries.sort_by(|a, b| a.key.cmp(&b.key));
		}

		if !map.is_flagged() {
			self.put_container_len(Tag::Hash, None, entries.len())?;
			for entry in entries {
				self.encode_node(entry.value, depth + 1)?;
				self.out.put_len(entry.key.len(), self.header.endianness())?;
				self.out.put_bytes(&entry.key);
			}
			return Ok(());
		}

		self.put_container_len(Tag::FlagHash, Some(map.hash_flags.unwrap_or(0)), entries.len())?;
		for entry in entries {
			self.encode_node(entry.value, depth + 1)?;
			self.out.put_u8(entry.flags);
			if entry.flags & key_flags::IS_SV != 0 {
				self.tags.skip();
				self.put_string(&entry.key, entry.flags & key_flags::UTF8 != 0)?;
			} else {
				self.out.put_len(entry.key.len(), self.header.endianness())?;
				self.out.put_bytes(&entry.key);
			}
		}
		Ok(())
	}

	fn encode_hook(&mut self, hook: &'g Hook, depth: u32) -> Result<()> {
		let (obj_type, extra) = match hook.kind {
			HookKind::Scalar => (hook_flags::TYPE_SCALAR, None),
			HookKind::Array => (hook_flags::TYPE_ARRAY, None),
			HookKind::Hash => (hook_flags::TYPE_HASH, None),
			HookKind::TiedScalar => (hook_flags::TYPE_EXTRA, Some(hook_flags::EXTRA_TIED_SCALAR)),
			HookKind::TiedArray => (hook_flags::TYPE_EXTRA, Some(hook_flags::EXTRA_TIED_ARRAY)),
			HookKind::TiedHash => (hook_flags::TYPE_EXTRA, Some(hook_flags::EXTRA_TIED_HASH)),
		};

		let mut started = false;
		for &target in &hook.refs {
			if self.tags.lookup(target).is_some() {
				self.refuse_alias(target)?;
				continue;
			}
			if matches!(self.graph.node(target)?, Value::Immortal(Immortal::Undef)) {
				return Err(StorableError::UnsupportedOperation {
					what: "hook cannot list immortal undef".to_owned(),
				});
			}
			self.put_hook_flags(&mut started, hook_flags::NEED_RECURSE | obj_type, extra)?;
			self.encode_node(target, depth + 1)?;
		}

		let mut flags = obj_type;
		let class_field = match self.classes.find(&hook.class) {
			Some(idx) => {
				flags |= hook_flags::IDX_CLASSNAME;
				idx as usize
			}
			None => {
				self.classes.register(hook.class.clone());
				hook.class.as_bytes().len()
			}
		};
		if class_field > MAX_SHORT_STRING {
			flags |= hook_flags::LARGE_CLASSLEN;
		}
		if hook.frozen.len() > MAX_SHORT_STRING {
			flags |= hook_flags::LARGE_STRLEN;
		}
		if !hook.refs.is_empty() {
			flags |= hook_flags::HAS_LIST;
			if hook.refs.len() > MAX_SHORT_STRING {
				flags |= hook_flags::LARGE_LISTLEN;
			}
		}
		self.put_hook_flags(&mut started, flags, extra)?;

		self.put_hook_len(class_field, flags & hook_flags::LARGE_CLASSLEN != 0)?;
		if flags & hook_flags::IDX_CLASSNAME == 0 {
			self.out.put_bytes(hook.class.as_bytes());
		}
		self.put_hook_len(hook.frozen.len(), flags & hook_flags::LARGE_STRLEN != 0)?;
		self.out.put_bytes(&hook.frozen);

		if !hook.refs.is_empty() {
			self.put_hook_len(hook.refs.len(), flags & hook_flags::LARGE_LISTLEN != 0)?;
			for &target in &hook.refs {
				let tag = self.tags.lookup(target).ok_or_else(|| StorableError::UnsupportedOperation {
					what: format!("hook object {target} has no object index"),
				})?;
				self.out.put_int(i64::from(tag), IntWidth::W32, Endianness::Big);
			}
		}

		match (hook.kind.is_tied(), hook.tied) {
			(true, Some(object)) => self.encode_node(object, depth + 1),
			(false, None) => Ok(()),
			(true, None) => Err(StorableError::UnsupportedOperation {
				what: "tied hook without a tie object".to_owned(),
			}),
			(false, Some(_)) => Err(StorableError::UnsupportedOperation {
				what: "untied hook carries a tie object".to_owned(),
			}),
		}
	}

	/// A blessed value's inner node shares the wrapper's index, so it cannot be referenced on its own.
	fn refuse_alias(&self, id: NodeId) -> Result<()> {
		if self.tags.is_alias(id) {
			return Err(StorableError::UnsupportedOperation {
				what: format!("blessed node {id} is also referenced unblessed"),
			});
		}
		Ok(())
	}

	/// The tag and tie type byte go out once, before the first flag byte.
	fn put_hook_flags(&mut self, started: &mut bool, flags: u8, extra: Option<u8>) -> Result<()> {
		if !*started {
			self.put_tag(Tag::Hook)?;
			self.out.put_u8(flags);
			if let Some(extra) = extra {
				self.out.put_u8(extra);
			}
			*started = true;
		} else {
			self.out.put_u8(flags);
		}
		Ok(())
	}

	fn put_hook_len(&mut self, len: usize, large: bool) -> Result<()> {
		if large {
			self.out.put_len(len, self.header.endianness())
		} else {
			self.out.put_u8(len as u8);
			Ok(())
		}
	}

	fn put_bless(&mut self, class: &ClassName) -> Result<()> {
		match self.classes.find(class) {
			Some(idx) => {
				self.put_tag(Tag::IxBless)?;
				self.put_class_field(idx as usize)
			}
			None => {
				self.classes.register(class.clone());
				self.put_tag(Tag::Bless)?;
				self.put_class_field(class.as_bytes().len())?;
				self.out.put_bytes(class.as_bytes());
				Ok(())
			}
		}
	}

	fn put_class_field(&mut self, value: usize) -> Result<()> {
		if value <= MAX_SHORT_CLASS {
			self.out.put_u8(value as u8);
			Ok(())
		} else {
			self.out.put_u8(0x80);
			self.out.put_len(value, self.header.endianness())
		}
	}

	fn put_integer(&mut self, value: i64) -> Result<()> {
		if (-128..=127).contains(&value) {
			self.put_tag(Tag::Byte)?;
			self.out.put_u8((value + 128) as u8);
			return Ok(());
		}

		match self.header.layout {
			Layout::Network if IntWidth::W32.fits(value) => {
				self.put_tag(Tag::NetInt)?;
				self.out.put_int(value, IntWidth::W32, Endianness::Big);
				Ok(())
			}
			// Wider values stay integers: a 64-bit `INTEGER` in host order.
			Layout::Network => {
				self.put_tag(Tag::Integer)?;
				self.out.put_int(value, IntWidth::W64, self.header.value_endianness());
				Ok(())
			}
			Layout::Native(native) if native.byteorder.width.fits(value) => {
				self.put_tag(Tag::Integer)?;
				self.out.put_int(value, native.byteorder.width, native.byteorder.endianness);
				Ok(())
			}
			_ => self.put_string(value.to_string().as_bytes(), false),
		}
	}

	fn put_string(&mut self, bytes: &[u8], utf8: bool) -> Result<()> {
		let (small, large) = if utf8 { (Tag::Utf8Str, Tag::LUtf8Str) } else { (Tag::Scalar, Tag::LScalar) };
		if bytes.len() <= MAX_SHORT_STRING {
			self.put_tag(small)?;
			self.out.put_u8(bytes.len() as u8);
		} else {
			self.put_container_len(large, None, bytes.len())?;
		}
		self.out.put_bytes(bytes);
		Ok(())
	}

	/// Tag and `I32` length, or the `LOBJECT` form when the length does not fit.
	fn put_container_len(&mut self, tag: Tag, hash_flags: Option<u8>, len: usize) -> Result<()> {
		if i32::try_from(len).is_ok() {
			self.put_tag(tag)?;
			if let Some(flags) = hash_flags {
				self.out.put_u8(flags);
			}
			return self.out.put_len(len, self.header.endianness());
		}

		self.put_tag(Tag::LObject)?;
		self.check_minor(tag)?;
		self.out.put_u8(tag.byte());
		if let Some(flags) = hash_flags {
			self.out.put_u8(flags);
		}
		self.out.put_u64(len as u64, self.header.endianness());
		Ok(())
	}

	fn put_short_len(&mut self, len: usize) -> Result<()> {
		let short = u8::try_from(len).map_err(|_| StorableError::LengthOutOfRange {
			len: len as i64,
			at: self.out.len(),
			max: MAX_SHORT_STRING,
		})?;
		self.out.put_u8(short);
		Ok(())
	}

	fn put_tag(&mut self, tag: Tag) -> Result<()> {
		self.check_minor(tag)?;
		self.out.put_u8(tag.byte());
		Ok(())
	}

	fn check_minor(&self, tag: Tag) -> Result<()> {
		let since = tag.info().since_minor;
		if since > self.opt.minor {
			return Err(StorableError::UnsupportedOperation {
				what: format!("{} needs binary 2.{since}, target is 2.{}", tag.name(), self.opt.minor),
			});
		}
		Ok(())
	}
}
