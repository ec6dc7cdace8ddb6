//! CLI schema for the `ofdview` binary.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "ofdview")]
#[command(about = "Open an OFD document in headless views and show what they render")]
#[command(version)]
pub struct Cli {
	/// Document to open (opens an untitled document if omitted)
	pub file: Option<PathBuf>,

	/// Restore the document's bytes from this backup
	#[arg(long, value_name = "PATH")]
	pub backup: Option<PathBuf>,

	/// Number of views to attach
	#[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=64))]
	pub views: u32,

	/// Viewport width in pixels (overrides the config file)
	#[arg(long, value_name = "PX")]
	pub width: Option<u32>,

	/// Ask the views for their bytes after rendering
	#[arg(long)]
	pub fetch: bool,

	/// Configuration file
	#[arg(long, value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	pub verbose: bool,
}
