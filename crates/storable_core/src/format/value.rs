use std::collections::HashMap;
use std::fmt;

use crate::format::{Result, StorableError};

/// Identity of one node inside a [`Graph`].
///
/// Two positions holding the same id are the same object; equal content under
/// different ids are distinct objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
	/// Position of the node in the arena.
	pub fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Perl package name attached by blessing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassName(Box<[u8]>);

impl ClassName {
	/// Build a class name from raw bytes.
	pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
		Self(bytes.into())
	}

	/// Raw class name bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl From<&str> for ClassName {
	fn from(value: &str) -> Self {
		Self(value.as_bytes().into())
	}
}

impl fmt::Display for ClassName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&String::from_utf8_lossy(&self.0))
	}
}

/// Interpreter-owned singleton scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immortal {
	/// `PL_sv_undef`; never shared through back-references.
	Undef,
	/// `PL_sv_yes`.
	Yes,
	/// `PL_sv_no`.
	No,
	/// Placeholder for a nonexistent array element.
	UndefElem,
}

/// What a tie proxy stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieKind {
	/// Tied array.
	Array,
	/// Tied hash.
	Hash,
	/// Tied scalar.
	Scalar,
	/// Element of a tied hash, keyed by a stored value.
	Key(NodeId),
	/// Element of a tied array.
	Index(i32),
}

/// Container kind recreated by a `STORABLE_thaw` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
	/// Plain scalar.
	Scalar,
	/// Plain array.
	Array,
	/// Plain hash.
	Hash,
	/// Tied scalar; the hook carries its tie object.
	TiedScalar,
	/// Tied array; the hook carries its tie object.
	TiedArray,
	/// Tied hash; the hook carries its tie object.
	TiedHash,
}

impl HookKind {
	/// Return `true` for kinds that need a tie object.
	pub fn is_tied(self) -> bool {
		matches!(self, Self::TiedScalar | Self::TiedArray | Self::TiedHash)
	}
}

/// Serialized output of a class's `STORABLE_freeze` hook.
#[derive(Debug, Clone, PartialEq)]
pub struct Hook {
	/// Class the object is blessed into.
	pub class: ClassName,
	/// Kind of container the hook recreates.
	pub kind: HookKind,
	/// Opaque string returned by the hook.
	pub frozen: Vec<u8>,
	/// Extra objects returned by the hook, in order.
	pub refs: Vec<NodeId>,
	/// Tie object for tied kinds.
	pub tied: Option<NodeId>,
}

/// Source text captured for a code reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSource {
	/// Deparsed source bytes.
	pub text: Vec<u8>,
	/// Whether the source scalar was flagged UTF-8.
	pub utf8: bool,
}

/// Per-key flag bits of flagged hashes.
pub mod key_flags {
	/// Key bytes are UTF-8.
	pub const UTF8: u8 = 0x01;
	/// Key was downgraded from UTF-8.
	pub const WAS_UTF8: u8 = 0x02;
	/// Key is locked in a restricted hash.
	pub const LOCKED: u8 = 0x04;
	/// Key is stored as a full scalar.
	pub const IS_SV: u8 = 0x08;
	/// Entry is a restricted-hash placeholder.
	pub const PLACEHOLDER: u8 = 0x10;
}

/// Hash-level flag bit marking a restricted hash.
pub const HASH_RESTRICTED: u8 = 0x01;

/// One key/value pair of a [`Mapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
	/// Key bytes.
	pub key: Vec<u8>,
	/// Value node.
	pub value: NodeId,
	/// Flag byte from a flagged hash, `0` otherwise.
	pub flags: u8,
}

/// Hash-like container with byte-string keys in stream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
	/// Entries in decode (or insertion) order.
	pub entries: Vec<MapEntry>,
	/// Hash-level flag byte when written as a flagged hash.
	pub hash_flags: Option<u8>,
}

impl Mapping {
	/// Build an unflagged mapping from key/value pairs.
	pub fn from_pairs<K: Into<Vec<u8>>>(pairs: impl IntoIterator<Item = (K, NodeId)>) -> Self {
		Self {
			entries: pairs
				.into_iter()
				.map(|(key, value)| MapEntry {
					key: key.into(),
					value,
					flags: 0,
				})
				.collect(),
			hash_flags: None,
		}
	}

	/// Return `true` when this mapping needs the flagged-hash encoding.
	pub fn is_flagged(&self) -> bool {
		self.hash_flags.is_some() || self.entries.iter().any(|entry| entry.flags != 0)
	}

	/// Look up a value by key bytes.
	pub fn get(&self, key: &[u8]) -> Option<NodeId> {
		self.entries.iter().find(|entry| entry.key == key).map(|entry| entry.value)
	}

	/// Return the first key that occurs twice, if any.
	pub fn duplicate_key(&self) -> Option<&[u8]> {
		let mut seen = std::collections::HashSet::with_capacity(self.entries.len());
		self.entries.iter().map(|entry| entry.key.as_slice()).find(|key| !seen.insert(*key))
	}
}

/// One node of a decoded or to-be-encoded object graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	/// Fresh undefined scalar.
	Undefined,
	/// Interpreter singleton scalar.
	Immortal(Immortal),
	/// Signed integer.
	Integer(i64),
	/// IEEE-754 double.
	Double(f64),
	/// Byte string without the UTF-8 flag.
	ByteString(Vec<u8>),
	/// String flagged as UTF-8.
	TextString(Vec<u8>),
	/// String scalar carrying v-string magic.
	VString {
		/// Original v-string literal.
		magic: Vec<u8>,
		/// String value.
		string: Vec<u8>,
		/// Whether the string value is flagged UTF-8.
		utf8: bool,
	},
	/// Array of nodes.
	Sequence(Vec<NodeId>),
	/// Hash of nodes.
	Mapping(Mapping),
	/// Strong reference.
	Reference(NodeId),
	/// Weak reference.
	WeakReference(NodeId),
	/// Reference to an object with overloaded operators.
	Overloaded(NodeId),
	/// Weak reference to an object with overloaded operators.
	WeakOverloaded(NodeId),
	/// Value blessed into a class. Shares its object index with `inner`.
	Blessed {
		/// Class name.
		class: ClassName,
		/// Blessed value.
		inner: NodeId,
	},
	/// Proxy-backed container or element.
	Tied {
		/// What the proxy stands in for.
		kind: TieKind,
		/// Object implementing the tie.
		object: NodeId,
	},
	/// Object serialized through `STORABLE_freeze`.
	Hook(Hook),
	/// Code reference; `None` when no source was captured.
	CodeRef(Option<CodeSource>),
	/// Compiled pattern.
	Regexp {
		/// Pattern source bytes.
		pattern: Vec<u8>,
		/// Modifier flags such as `i` or `msix`.
		flags: Vec<u8>,
	},
}

impl Value {
	/// Short kind label used in diagnostics and CLI output.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Undefined => "undef",
			Self::Immortal(_) => "immortal",
			Self::Integer(_) => "integer",
			Self::Double(_) => "double",
			Self::ByteString(_) => "bytes",
			Self::TextString(_) => "text",
			Self::VString { .. } => "vstring",
			Self::Sequence(_) => "sequence",
			Self::Mapping(_) => "mapping",
			Self::Reference(_) => "ref",
			Self::WeakReference(_) => "weakref",
			Self::Overloaded(_) => "overloaded",
			Self::WeakOverloaded(_) => "weak_overloaded",
			Self::Blessed { .. } => "blessed",
			Self::Tied { .. } => "tied",
			Self::Hook(_) => "hook",
			Self::CodeRef(_) => "code",
			Self::Regexp { .. } => "regexp",
		}
	}

	/// Nodes directly reachable from this value, in encoding order.
	pub fn children(&self) -> Vec<NodeId> {
		match self {
			Self::Sequence(items) => items.clone(),
			Self::Mapping(map) => map.entries.iter().map(|entry| entry.value).collect(),
			Self::Reference(target) | Self::WeakReference(target) | Self::Overloaded(target) | Self::WeakOverloaded(target) => vec![*target],
			Self::Blessed { inner, .. } => vec![*inner],
			Self::Tied { kind, object } => match kind {
				TieKind::Key(key) => vec![*object, *key],
				_ => vec![*object],
			},
			Self::Hook(hook) => hook.refs.iter().copied().chain(hook.tied).collect(),
			_ => Vec::new(),
		}
	}
}

/// Arena-backed object graph with an optional root.
///
/// Shared and cyclic structure is expressed by storing the same [`NodeId`] in
/// several places; nodes never own each other.
#[derive(Debug, Clone, Default)]
pub struct Graph {
	nodes: Vec<Value>,
	root: Option<NodeId>,
}

impl Graph {
	/// Create an empty graph.
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a node and return its id.
	pub fn add(&mut self, value: Value) -> NodeId {
		let id = NodeId(self.nodes.len() as u32);
		self.nodes.push(value);
		id
	}

	/// Append a node and make it the root.
	pub fn add_root(&mut self, value: Value) -> NodeId {
		let id = self.add(value);
		self.root = Some(id);
		id
	}

	/// Replace the value stored at `id`.
	pub fn set(&mut self, id: NodeId, value: Value) -> Result<()> {
		let slot = self.nodes.get_mut(id.index()).ok_or(StorableError::InvalidNode { id: id.0 })?;
		*slot = value;
		Ok(())
	}

	/// Borrow the value stored at `id`.
	pub fn get(&self, id: NodeId) -> Option<&Value> {
		self.nodes.get(id.index())
	}

	/// Borrow the value stored at `id`, failing on dangling ids.
	pub fn node(&self, id: NodeId) -> Result<&Value> {
		self.get(id).ok_or(StorableError::InvalidNode { id: id.0 })
	}

	/// Root node, if one was set.
	pub fn root(&self) -> Option<NodeId> {
		self.root
	}

	/// Set the root node.
	pub fn set_root(&mut self, id: NodeId) {
		self.root = Some(id);
	}

	/// Number of nodes in the arena, including unreachable ones.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Return `true` when the arena holds no nodes.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Follow references until a non-reference node is reached.
	///
	/// Stops at the first repeated node so reference cycles terminate.
	pub fn deref(&self, mut id: NodeId) -> Option<NodeId> {
		let mut hops = 0;
		while let Some(Value::Reference(next) | Value::WeakReference(next) | Value::Overloaded(next) | Value::WeakOverloaded(next)) = self.get(id) {
			if hops > self.nodes.len() {
				return None;
			}
			id = *next;
			hops += 1;
		}
		Some(id)
	}

	/// Compare two graphs from their roots as aliasing-aware isomorphisms.
	///
	/// Shared nodes in `self` must correspond to shared nodes in `other` and
	/// distinct nodes to distinct nodes. Immortals compare by kind only.
	pub fn structurally_eq(&self, other: &Graph) -> bool {
		match (self.root, other.root) {
			(Some(left), Some(right)) => Isomorphism::new(self, other).check(left, right),
			(None, None) => true,
			_ => false,
		}
	}
}

struct Isomorphism<'a> {
	left: &'a Graph,
	right: &'a Graph,
	forward: HashMap<NodeId, NodeId>,
	backward: HashMap<NodeId, NodeId>,
}

impl<'a> Isomorphism<'a> {
	fn new(left: &'a Graph, right: &'a Graph) -> Self {
		Self {
			left,
			right,
			forward: HashMap::new(),
			backward: HashMap::new(),
		}
	}

	fn check(&mut self, root_left: NodeId, root_right: NodeId) -> bool {
		let mut pending = vec![(root_left, root_right)];
		while let Some((l, r)) = pending.pop() {
			let (Some(lv), Some(rv)) = (self.left.get(l), self.right.get(r)) else {
				return false;
			};

			if !matches!(lv, Value::Immortal(_)) {
				match (self.forward.get(&l), self.backward.get(&r)) {
					(Some(mapped), _) if *mapped != r => return false,
					(_, Some(mapped)) if *mapped != l => return false,
					(Some(_), Some(_)) => continue,
					_ => {
						self.forward.insert(l, r);
						self.backward.insert(r, l);
					}
				}
			}

			if !shallow_eq(lv, rv) {
				return false;
			}
			let (lc, rc) = (lv.children(), rv.children());
			if lc.len() != rc.len() {
				return false;
			}
			pending.extend(lc.into_iter().zip(rc));
		}
		true
	}
}

fn shallow_eq(left: &Value, right: &Value) -> bool {
	match (left, right) {
		(Value::Double(l), Value::Double(r)) => l.to_bits() == r.to_bits(),
		(Value::Sequence(l), Value::Sequence(r)) => l.len() == r.len(),
		(Value::Mapping(l), Value::Mapping(r)) => {
			l.hash_flags == r.hash_flags
				&& l.entries.len() == r.entries.len()
				&& l.entries.iter().zip(&r.entries).all(|(le, re)| le.key == re.key && le.flags == re.flags)
		}
		(Value::Reference(_), Value::Reference(_))
		| (Value::WeakReference(_), Value::WeakReference(_))
		| (Value::Overloaded(_), Value::Overloaded(_))
		| (Value::WeakOverloaded(_), Value::WeakOverloaded(_)) => true,
		(Value::Blessed { class: l, .. }, Value::Blessed { class: r, .. }) => l == r,
		(Value::Tied { kind: l, .. }, Value::Tied { kind: r, .. }) => match (l, r) {
			(TieKind::Key(_), TieKind::Key(_)) => true,
			_ => l == r,
		},
		(Value::Hook(l), Value::Hook(r)) => l.class == r.class && l.kind == r.kind && l.frozen == r.frozen && l.refs.len() == r.refs.len() && l.tied.is_some() == r.tied.is_some(),
		_ => left == right,
	}
}
