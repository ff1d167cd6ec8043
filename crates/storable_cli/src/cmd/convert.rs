use std::path::PathBuf;

use storable::format::{EncodeOptions, Framing, Layout, Result, freeze_with, store_with};

use crate::cmd::util::{layout_label, read_image};

#[derive(clap::Args)]
pub struct Args {
	pub input: PathBuf,
	pub output: PathBuf,
	/// Write portable network order instead of keeping the input layout.
	#[arg(long)]
	pub network: bool,
	/// Sort hash keys.
	#[arg(long)]
	pub canonical: bool,
	/// Omit the `pst0` file magic, as `freeze` does.
	#[arg(long)]
	pub memory: bool,
}

/// Decode an image and write it back with the requested layout and framing.
pub fn run(args: Args) -> Result<()> {
	let Args {
		input,
		output,
		network,
		canonical,
		memory,
	} = args;

	let thawed = read_image(&input)?;
	let mut options = EncodeOptions::for_header(&thawed.header, Framing::File);
	if network {
		options.layout = Layout::Network;
	}
	options.canonical = canonical;

	let written = if memory {
		options.framing = Framing::Memory;
		let bytes = freeze_with(&thawed.graph, &options)?;
		std::fs::write(&output, &bytes)?;
		bytes.len()
	} else {
		store_with(&thawed.graph, &output, &options)?;
		std::fs::metadata(&output)?.len() as usize
	};

	println!("input: {} ({}, {})", input.display(), thawed.framing.as_str(), layout_label(thawed.header.layout));
	println!("output: {} ({}, {})", output.display(), options.framing.as_str(), layout_label(options.layout));
	println!("bytes: {written}");
	Ok(())
}
