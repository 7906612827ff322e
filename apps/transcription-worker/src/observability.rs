use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,transcription_queue=debug,transcription_worker=debug";

/// Initialize tracing with an env-driven filter and a plain or JSON fmt layer
pub fn init_tracing(json: bool) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

	let registry = tracing_subscriber::registry().with(env_filter);
	if json {
		registry.with(tracing_subscriber::fmt::layer().json().with_target(true).with_writer(std::io::stderr)).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr)).init();
	}
}

/// Render every registered collector in the Prometheus text format
pub fn render_metrics(registry: &Registry) -> Result<String> {
	let mut buffer = Vec::new();
	TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
	Ok(String::from_utf8(buffer)?)
}

pub fn log_metrics(registry: &Registry) -> Result<()> {
	let rendered = render_metrics(registry)?;
	for line in rendered.lines().filter(|line| !line.starts_with('#')) {
		info!(metric = line, "📈 Queue metric");
	}
	Ok(())
}
