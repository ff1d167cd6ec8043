use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::format::decode::decode_image;
use crate::format::{DecodeOptions, EncodeOptions, Framing, Graph, Result, Thawed, freeze_with};

/// Write a graph to `path` the way `store` (or `nstore` with `network_order`) does.
///
/// Content is undefined if encoding fails after the file was created.
pub fn store(graph: &Graph, path: impl AsRef<Path>, network_order: bool) -> Result<()> {
	store_with(graph, path, &EncodeOptions::host(network_order))
}

/// Write a graph to `path`, always with the `pst0` file magic.
pub fn store_with(graph: &Graph, path: impl AsRef<Path>, opt: &EncodeOptions) -> Result<()> {
	let mut file = File::create(path)?;
	let opt = EncodeOptions {
		framing: Framing::File,
		..opt.clone()
	};
	let bytes = freeze_with(graph, &opt)?;
	file.write_all(&bytes)?;
	file.flush()?;
	Ok(())
}

/// Read and decode a file written by `store`/`nstore`.
pub fn retrieve(path: impl AsRef<Path>) -> Result<Graph> {
	Ok(retrieve_with(path, &DecodeOptions::default())?.graph)
}

/// Read and decode a file with explicit limits, keeping framing and header.
pub fn retrieve_with(path: impl AsRef<Path>, opt: &DecodeOptions) -> Result<Thawed> {
	let raw = fs::read(path)?;
	decode_image(&raw, Framing::File, opt)
}
