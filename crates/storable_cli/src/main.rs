#![allow(missing_docs)]

use clap::{Parser, Subcommand};

mod cmd;

#[derive(Parser)]
#[command(name = "storable", about = "Perl Storable image inspection and conversion tools")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Print header and graph statistics.
	Info(cmd::info::Args),
	/// Print the decoded object graph.
	Dump(cmd::dump::Args),
	/// Re-encode an image with different layout or framing.
	Convert(cmd::convert::Args),
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> storable::format::Result<()> {
	let cli = Cli::parse();

	match cli.command {
		Commands::Info(args) => cmd::info::run(args),
		Commands::Dump(args) => cmd::dump::run(args),
		Commands::Convert(args) => cmd::convert::run(args),
	}
}
