use std::collections::HashSet;
use std::path::Path;

use storable::format::{DecodeOptions, Graph, Layout, NodeId, Result, Thawed, thaw_with};

/// Read an image from disk, accepting both file and memory framing.
pub(crate) fn read_image(path: &Path) -> Result<Thawed> {
	let raw = std::fs::read(path)?;
	thaw_with(&raw, &DecodeOptions::default())
}

/// Print a serializable payload as pretty JSON on stdout.
pub(crate) fn emit_json<T: serde::Serialize>(payload: &T) {
	match serde_json::to_string_pretty(payload) {
		Ok(text) => println!("{text}"),
		Err(err) => eprintln!("error: json encode failed: {err}"),
	}
}

/// Render raw bytes as a quoted, ASCII-escaped literal.
pub(crate) fn render_bytes(bytes: &[u8]) -> String {
	format!("\"{}\"", bytes.escape_ascii())
}

/// Short label for a body layout.
pub(crate) fn layout_label(layout: Layout) -> &'static str {
	match layout {
		Layout::Network => "network",
		Layout::Native(_) => "native",
	}
}

/// Nodes reachable from the root, in first-visit order.
pub(crate) fn reachable(graph: &Graph) -> Vec<NodeId> {
	let mut seen = HashSet::new();
	let mut order = Vec::new();
	let mut pending: Vec<NodeId> = graph.root().into_iter().collect();

	while let Some(id) = pending.pop() {
		if !seen.insert(id) {
			continue;
		}
		order.push(id);
		if let Some(value) = graph.get(id) {
			pending.extend(value.children().into_iter().rev());
		}
	}
	order
}
