//! `ofdview`: opens an OFD document through the sync provider and prints what headless
//! views render.

mod app;
mod cli;
mod config;
mod probe;

use clap::Parser;
use cli::Cli;
use config::Config;
use tracing::Level;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let config = Config::discover(cli.config.as_deref())?;

	let level = if cli.verbose {
		Level::DEBUG
	} else {
		config.log.level()?.unwrap_or(Level::INFO)
	};
	let subscriber = tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	let report = app::run(&cli, config).await?;
	print!("{report}");
	Ok(())
}
