use color_eyre::Result;
use sha2::{Digest, Sha256};
use tracing::{error, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt::format, layer::SubscriberExt, EnvFilter, FmtSubscriber};

use crate::types::ADDRESS_LEN;

pub fn sha2_256(data: &[u8]) -> [u8; 32] {
	Sha256::digest(data).into()
}

/// Derives a validator address from its raw public key: the first 20 bytes
/// of the SHA-256 digest.
pub fn key_address(public_key: &[u8]) -> [u8; ADDRESS_LEN] {
	let digest = sha2_256(public_key);
	let mut address = [0u8; ADDRESS_LEN];
	address.copy_from_slice(&digest[..ADDRESS_LEN]);
	address
}

fn env_filter(log_level: Level) -> EnvFilter {
	EnvFilter::new(format!(
		"comet_light_core={log_level},comet_light_client={log_level},warn"
	))
}

pub fn json_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.json()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

pub fn default_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

pub fn install_panic_hooks() -> Result<()> {
	// initialize color-eyre hooks
	let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
		.display_location_section(true)
		.display_env_section(true)
		.into_hooks();

	// install hook as global handler
	eyre_hook.install()?;

	std::panic::set_hook(Box::new(move |panic_info| {
		let msg = format!("{}", panic_hook.panic_report(panic_info));
		error!("Error: {}", strip_ansi_escapes::strip_str(msg));

		#[cfg(debug_assertions)]
		{
			// better-panic stacktrace that is only enabled when debugging
			better_panic::Settings::auto()
				.most_recent_first(false)
				.lineno_suffix(true)
				.verbosity(better_panic::Verbosity::Medium)
				.create_panic_handler()(panic_info);
		}
	}));
	Ok(())
}
