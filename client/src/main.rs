#![doc = include_str!("../README.md")]

use std::{fs, path::Path, process::ExitCode};

use clap::Parser;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use comet_light_core::{
	commit::import_signed_header,
	finality::verify_commit,
	types::VerifyOutcome,
	utils::{default_subscriber, install_panic_hooks, json_subscriber},
	validator_set::import_validator_set,
};
use serde_json::Value;
use tracing::{error, info};

use crate::cli::CliOpts;
use crate::config::RuntimeConfig;

mod cli;
mod config;

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg: RuntimeConfig = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {config_path}"))?
	} else {
		RuntimeConfig::default()
	};

	// Flags override the config parameters
	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	Ok(cfg)
}

/// Reads a JSON document from disk, unwrapping the JSON-RPC envelope when the
/// response was saved straight from a node.
fn load_document(path: &Path) -> Result<Value> {
	let raw = fs::read_to_string(path)
		.wrap_err_with(|| format!("Failed to read {}", path.display()))?;
	let document: Value =
		serde_json::from_str(&raw).wrap_err_with(|| format!("Invalid JSON in {}", path.display()))?;

	match document.get("result") {
		Some(inner) => Ok(inner.clone()),
		None => Ok(document),
	}
}

fn run(opts: &CliOpts) -> Result<VerifyOutcome> {
	let version = clap::crate_version!();
	info!(version, "Running {}", clap::crate_name!());

	let validators_doc = load_document(&opts.validators)?;
	let commit_doc = load_document(&opts.commit)?;

	let (validator_set, crypto_index) = import_validator_set(&validators_doc)?;
	info!(
		"Imported {} validators at height {} with total power {}",
		validator_set.len(),
		validator_set.height(),
		validator_set.total_voting_power()
	);

	let signed_header = import_signed_header(&commit_doc)?;
	info!(
		"Imported commit for chain {} at height {}",
		signed_header.header.chain_id, signed_header.commit.height
	);

	verify_commit(&signed_header, &validator_set, &crypto_index)
}

fn main() -> Result<ExitCode> {
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	};

	install_panic_hooks()?;

	let outcome = match run(&opts) {
		Ok(outcome) => outcome,
		Err(report) => {
			error!("{report:#}");
			return Err(report.wrap_err("Commit verification failed"));
		},
	};

	println!("{}", serde_json::to_string_pretty(&outcome)?);

	Ok(if outcome.ok {
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	})
}
