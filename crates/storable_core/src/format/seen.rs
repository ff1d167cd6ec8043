use std::collections::{HashMap, HashSet};

use crate::format::{ClassName, NodeId, Result, StorableError};

/// Decode-time map from object index to the node materialized at that index.
///
/// Slots without a node hold indices consumed by values that are not part of
/// the graph (such as the source text of a code reference).
#[derive(Debug, Default)]
pub struct SeenTable {
	slots: Vec<Option<NodeId>>,
}

impl SeenTable {
	/// Assign the next index to `node` and return it.
	pub fn record(&mut self, node: Option<NodeId>) -> u32 {
		self.slots.push(node);
		(self.slots.len() - 1) as u32
	}

	/// Resolve a back-reference read at offset `at`.
	pub fn resolve(&self, index: u32, at: usize) -> Result<NodeId> {
		self.slots
			.get(index as usize)
			.copied()
			.flatten()
			.ok_or(StorableError::InvalidBackReference {
				index,
				at,
				seen: self.slots.len(),
			})
	}

	/// Number of indices assigned so far.
	pub fn len(&self) -> usize {
		self.slots.len()
	}

	/// Return `true` when no index has been assigned.
	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}
}

/// Encode-time map from node identity to the index it was first written at.
#[derive(Debug, Default)]
pub struct TagTable {
	next: u32,
	tags: HashMap<NodeId, u32>,
	aliases: HashSet<NodeId>,
}

impl TagTable {
	/// Index previously assigned to `node`.
	pub fn lookup(&self, node: NodeId) -> Option<u32> {
		self.tags.get(&node).copied()
	}

	/// Assign the next index to `node`.
	pub fn assign(&mut self, node: NodeId) -> u32 {
		let tag = self.skip();
		self.tags.insert(node, tag);
		tag
	}

	/// Make `node` resolve to an index already assigned to another node.
	pub fn alias(&mut self, node: NodeId, tag: u32) {
		self.tags.insert(node, tag);
		self.aliases.insert(node);
	}

	/// Whether `node` only resolves through the index of its blessed wrapper.
	pub fn is_alias(&self, node: NodeId) -> bool {
		self.aliases.contains(&node)
	}

	/// Consume an index without binding it to a node.
	pub fn skip(&mut self) -> u32 {
		let tag = self.next;
		self.next += 1;
		tag
	}
}

/// Class names in first-seen order, shared by blessings and hooks.
#[derive(Debug, Default)]
pub struct ClassTable {
	names: Vec<ClassName>,
	index: HashMap<ClassName, u32>,
}

impl ClassTable {
	/// Register a class name and return its index.
	pub fn register(&mut self, class: ClassName) -> u32 {
		let idx = self.names.len() as u32;
		self.index.entry(class.clone()).or_insert(idx);
		self.names.push(class);
		idx
	}

	/// Index of an already registered class.
	pub fn find(&self, class: &ClassName) -> Option<u32> {
		self.index.get(class).copied()
	}

	/// Class registered at `idx`, read at offset `at`.
	pub fn get(&self, idx: u32, at: usize) -> Result<&ClassName> {
		self.names.get(idx as usize).ok_or(StorableError::InvalidClassIndex {
			index: idx,
			at,
			known: self.names.len(),
		})
	}
}
