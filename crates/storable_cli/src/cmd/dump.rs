use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde_json::{Map, Value as JsonValue, json};
use storable::format::{Graph, HookKind, Immortal, NodeId, Result, TieKind, Value};

use crate::cmd::util::{emit_json, render_bytes, read_image};

#[derive(clap::Args)]
pub struct Args {
	pub path: PathBuf,
	#[arg(long)]
	pub json: bool,
}

/// Print the decoded graph, marking repeated nodes as back-references.
pub fn run(args: Args) -> Result<()> {
	let Args { path, json } = args;

	let thawed = read_image(&path)?;
	let graph = &thawed.graph;
	let Some(root) = graph.root() else {
		println!("(empty)");
		return Ok(());
	};

	if json {
		let value = JsonDump::new(graph).node(root);
		emit_json(&json!({
			"path": path.display().to_string(),
			"framing": thawed.framing.as_str(),
			"minor": thawed.header.minor,
			"network": thawed.header.is_network(),
			"root": value,
		}));
		return Ok(());
	}

	let mut dump = TextDump::new(graph);
	dump.node(root, 0, "");
	print!("{}", dump.out);
	Ok(())
}

struct TextDump<'g> {
	graph: &'g Graph,
	seen: HashSet<NodeId>,
	out: String,
}

impl<'g> TextDump<'g> {
	fn new(graph: &'g Graph) -> Self {
		Self {
			graph,
			seen: HashSet::new(),
			out: String::new(),
		}
	}

	fn line(&mut self, depth: usize, label: &str, text: std::fmt::Arguments<'_>) {
		let _ = writeln!(self.out, "{:indent$}{label}{text}", "", indent = depth * 2);
	}

	fn node(&mut self, id: NodeId, depth: usize, label: &str) {
		let graph = self.graph;
		let Some(value) = graph.get(id) else {
			self.line(depth, label, format_args!("{id} <missing>"));
			return;
		};
		if !matches!(value, Value::Immortal(_)) && !self.seen.insert(id) {
			self.line(depth, label, format_args!("-> {id}"));
			return;
		}

		match value {
			Value::Undefined => self.line(depth, label, format_args!("{id} undef")),
			Value::Immortal(immortal) => self.line(depth, label, format_args!("{id} {}", immortal_label(*immortal))),
			Value::Integer(v) => self.line(depth, label, format_args!("{id} integer {v}")),
			Value::Double(v) => self.line(depth, label, format_args!("{id} double {v}")),
			Value::ByteString(bytes) => self.line(depth, label, format_args!("{id} bytes {}", render_bytes(bytes))),
			Value::TextString(bytes) => self.line(depth, label, format_args!("{id} text {}", render_bytes(bytes))),
			Value::VString { magic, string, .. } => self.line(depth, label, format_args!("{id} vstring {} {}", render_bytes(magic), render_bytes(string))),
			Value::Sequence(items) => {
				self.line(depth, label, format_args!("{id} sequence ({})", items.len()));
				for (idx, item) in items.iter().enumerate() {
					self.node(*item, depth + 1, &format!("[{idx}] "));
				}
			}
			Value::Mapping(map) => {
				let flags = map.hash_flags.map(|flags| format!(" flags=0x{flags:02x}")).unwrap_or_default();
				self.line(depth, label, format_args!("{id} mapping ({}){flags}", map.entries.len()));
				for entry in &map.entries {
					let key = if entry.flags != 0 {
						format!("{} [0x{:02x}]: ", render_bytes(&entry.key), entry.flags)
					} else {
						format!("{}: ", render_bytes(&entry.key))
					};
					self.node(entry.value, depth + 1, &key);
				}
			}
			Value::Reference(target) | Value::WeakReference(target) | Value::Overloaded(target) | Value::WeakOverloaded(target) => {
				self.line(depth, label, format_args!("{id} {}", value.kind()));
				self.node(*target, depth + 1, "");
			}
			Value::Blessed { class, inner } => {
				self.line(depth, label, format_args!("{id} blessed {class}"));
				self.node(*inner, depth + 1, "");
			}
			Value::Tied { kind, object } => {
				self.line(depth, label, format_args!("{id} tied {}", tie_label(*kind)));
				self.node(*object, depth + 1, "object: ");
				match kind {
					TieKind::Key(key) => self.node(*key, depth + 1, "key: "),
					TieKind::Index(index) => self.line(depth + 1, "index: ", format_args!("{index}")),
					_ => {}
				}
			}
			Value::Hook(hook) => {
				self.line(
					depth,
					label,
					format_args!("{id} hook {} {} frozen={}", hook.class, hook_label(hook.kind), render_bytes(&hook.frozen)),
				);
				for (idx, item) in hook.refs.iter().enumerate() {
					self.node(*item, depth + 1, &format!("ref[{idx}] "));
				}
				if let Some(tied) = hook.tied {
					self.node(tied, depth + 1, "tie: ");
				}
			}
			Value::CodeRef(source) => match source {
				Some(source) => self.line(depth, label, format_args!("{id} code {}", render_bytes(&source.text))),
				None => self.line(depth, label, format_args!("{id} code <no source>")),
			},
			Value::Regexp { pattern, flags } => self.line(depth, label, format_args!("{id} regexp {} {}", render_bytes(pattern), render_bytes(flags))),
		}
	}
}

struct JsonDump<'g> {
	graph: &'g Graph,
	seen: HashSet<NodeId>,
}

impl<'g> JsonDump<'g> {
	fn new(graph: &'g Graph) -> Self {
		Self { graph, seen: HashSet::new() }
	}

	fn node(&mut self, id: NodeId) -> JsonValue {
		let graph = self.graph;
		let Some(value) = graph.get(id) else {
			return json!({ "$missing": id.0 });
		};
		if !matches!(value, Value::Immortal(_)) && !self.seen.insert(id) {
			return json!({ "$ref": id.0 });
		}

		let mut out = Map::new();
		out.insert("id".to_owned(), json!(id.0));
		out.insert("kind".to_owned(), json!(value.kind()));

		match value {
			Value::Undefined => {}
			Value::Immortal(immortal) => {
				out.insert("value".to_owned(), json!(immortal_label(*immortal)));
			}
			Value::Integer(v) => {
				out.insert("value".to_owned(), json!(v));
			}
			Value::Double(v) => {
				out.insert("value".to_owned(), json!(v));
			}
			Value::ByteString(bytes) | Value::TextString(bytes) => {
				out.insert("value".to_owned(), json!(String::from_utf8_lossy(bytes)));
			}
			Value::VString { magic, string, utf8 } => {
				out.insert("magic".to_owned(), json!(String::from_utf8_lossy(magic)));
				out.insert("value".to_owned(), json!(String::from_utf8_lossy(string)));
				out.insert("utf8".to_owned(), json!(utf8));
			}
			Value::Sequence(items) => {
				let items: Vec<JsonValue> = items.iter().map(|item| self.node(*item)).collect();
				out.insert("items".to_owned(), JsonValue::Array(items));
			}
			Value::Mapping(map) => {
				if let Some(flags) = map.hash_flags {
					out.insert("hash_flags".to_owned(), json!(flags));
				}
				let entries: Vec<JsonValue> = map
					.entries
					.iter()
					.map(|entry| {
						json!({
							"key": String::from_utf8_lossy(&entry.key),
							"flags": entry.flags,
							"value": self.node(entry.value),
						})
					})
					.collect();
				out.insert("entries".to_owned(), JsonValue::Array(entries));
			}
			Value::Reference(target) | Value::WeakReference(target) | Value::Overloaded(target) | Value::WeakOverloaded(target) => {
				out.insert("target".to_owned(), self.node(*target));
			}
			Value::Blessed { class, inner } => {
				out.insert("class".to_owned(), json!(class.to_string()));
				out.insert("inner".to_owned(), self.node(*inner));
			}
			Value::Tied { kind, object } => {
				out.insert("tie".to_owned(), json!(tie_label(*kind)));
				out.insert("object".to_owned(), self.node(*object));
				match kind {
					TieKind::Key(key) => {
						out.insert("key".to_owned(), self.node(*key));
					}
					TieKind::Index(index) => {
						out.insert("index".to_owned(), json!(index));
					}
					_ => {}
				}
			}
			Value::Hook(hook) => {
				out.insert("class".to_owned(), json!(hook.class.to_string()));
				out.insert("hook_kind".to_owned(), json!(hook_label(hook.kind)));
				out.insert("frozen".to_owned(), json!(String::from_utf8_lossy(&hook.frozen)));
				let refs: Vec<JsonValue> = hook.refs.iter().map(|item| self.node(*item)).collect();
				out.insert("refs".to_owned(), JsonValue::Array(refs));
				if let Some(tied) = hook.tied {
					out.insert("tied".to_owned(), self.node(tied));
				}
			}
			Value::CodeRef(source) => {
				let text = source.as_ref().map(|source| String::from_utf8_lossy(&source.text).into_owned());
				out.insert("source".to_owned(), json!(text));
			}
			Value::Regexp { pattern, flags } => {
				out.insert("pattern".to_owned(), json!(String::from_utf8_lossy(pattern)));
				out.insert("flags".to_owned(), json!(String::from_utf8_lossy(flags)));
			}
		}

		JsonValue::Object(out)
	}
}

fn immortal_label(immortal: Immortal) -> &'static str {
	match immortal {
		Immortal::Undef => "sv_undef",
		Immortal::Yes => "sv_yes",
		Immortal::No => "sv_no",
		Immortal::UndefElem => "undef_elem",
	}
}

fn tie_label(kind: TieKind) -> &'static str {
	match kind {
		TieKind::Array => "array",
		TieKind::Hash => "hash",
		TieKind::Scalar => "scalar",
		TieKind::Key(_) => "key",
		TieKind::Index(_) => "index",
	}
}

fn hook_label(kind: HookKind) -> &'static str {
	match kind {
		HookKind::Scalar => "scalar",
		HookKind::Array => "array",
		HookKind::Hash => "hash",
		HookKind::TiedScalar => "tied_scalar",
		HookKind::TiedArray => "tied_array",
		HookKind::TiedHash => "tied_hash",
	}
}
