use std::collections::HashMap;
use std::path::PathBuf;

use storable::format::{Layout, Result, Thawed};

use crate::cmd::util::{emit_json, layout_label, reachable, read_image};

#[derive(clap::Args)]
pub struct Args {
	pub path: PathBuf,
	#[arg(long)]
	pub json: bool,
}

/// Print header fields and node statistics.
pub fn run(args: Args) -> Result<()> {
	let Args { path, json } = args;

	let thawed = read_image(&path)?;
	let info = collect(&path, &thawed);

	if json {
		emit_json(&info);
		return Ok(());
	}

	println!("path: {}", info.path);
	println!("framing: {}", info.framing);
	println!("version: {}.{}", info.major, info.minor);
	println!("layout: {}", info.layout);
	if let Some(native) = &info.native {
		println!("byteorder: {}", native.byteorder);
		println!("endianness: {}", native.endianness);
		println!("int_size: {}", native.int_size);
		println!("long_size: {}", native.long_size);
		println!("ptr_size: {}", native.ptr_size);
	}
	println!("iv_width: {}", info.iv_width);
	println!("node_count: {}", info.node_count);
	println!("root_kind: {}", info.root_kind);
	println!("kinds:");
	for entry in &info.kinds {
		println!("  {}: {}", entry.kind, entry.count);
	}

	Ok(())
}

fn collect(path: &std::path::Path, thawed: &Thawed) -> InfoJson {
	let Thawed { framing, header, graph } = thawed;

	let nodes = reachable(graph);
	let mut counts: HashMap<&'static str, usize> = HashMap::new();
	for id in &nodes {
		if let Some(value) = graph.get(*id) {
			*counts.entry(value.kind()).or_insert(0) += 1;
		}
	}
	let mut kinds: Vec<KindCountJson> = counts.into_iter().map(|(kind, count)| KindCountJson { kind, count }).collect();
	kinds.sort_by(|left, right| right.count.cmp(&left.count).then_with(|| left.kind.cmp(right.kind)));

	let native = match header.layout {
		Layout::Network => None,
		Layout::Native(native) => Some(NativeJson {
			byteorder: String::from_utf8_lossy(native.byteorder.as_bytes()).into_owned(),
			endianness: native.byteorder.endianness.as_str(),
			int_size: native.int_size,
			long_size: native.long_size,
			ptr_size: native.ptr_size,
		}),
	};

	InfoJson {
		path: path.display().to_string(),
		framing: framing.as_str(),
		major: header.major,
		minor: header.minor,
		layout: layout_label(header.layout),
		native,
		iv_width: header.int_width().bytes(),
		node_count: nodes.len(),
		root_kind: graph.root().and_then(|id| graph.get(id)).map_or("-", |value| value.kind()),
		kinds,
	}
}

#[derive(serde::Serialize)]
struct InfoJson {
	path: String,
	framing: &'static str,
	major: u8,
	minor: u8,
	layout: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	native: Option<NativeJson>,
	iv_width: usize,
	node_count: usize,
	root_kind: &'static str,
	kinds: Vec<KindCountJson>,
}

#[derive(serde::Serialize)]
struct NativeJson {
	byteorder: String,
	endianness: &'static str,
	int_size: u8,
	long_size: u8,
	ptr_size: u8,
}

#[derive(serde::Serialize)]
struct KindCountJson {
	kind: &'static str,
	count: usize,
}
