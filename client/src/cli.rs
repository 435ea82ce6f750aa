use std::path::PathBuf;

use clap::{command, Parser};
use tracing::Level;

#[derive(Parser)]
#[command(version, about = "Comet Light commit verifier")]
pub struct CliOpts {
	/// Path to the `/validators` JSON document
	#[arg(long)]
	pub validators: PathBuf,
	/// Path to the `/commit` JSON document
	#[arg(long)]
	pub commit: PathBuf,
	/// Path to the configuration file
	#[arg(short, long)]
	pub config: Option<String>,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Log format: JSON for JSON output
	#[arg(long)]
	pub logs_json: bool,
}
