// SPDX-License-Identifier: Apache-2.0
use std::env;
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry,
};

/// Selects the log output: `json` for Bunyan, anything else for console
pub const LOG_FORMAT_ENV: &str = "PORTALGATE_LOG_FORMAT";

/// Filter used when neither the env filter nor RUST_LOG is set.
/// ldap3 logs every protocol exchange at debug, so it is held at warn.
fn default_filter(name: &str, level: &str) -> String {
    format!("{}={},actix_web=info,ldap3=warn", name, level)
}

/// Initialize the tracing subscriber for the application
pub fn init_tracing<Sink>(name: &str, sink: Sink)
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    // Skip setting LogTracer if it's already been set
    let _ = LogTracer::init();

    // Get log level from environment or default to INFO
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            // Check if we have LOG environment variable
            let filter_level = env::var("RUST_LOG")
                .unwrap_or_else(|_| default_filter(name, "info"));
            EnvFilter::new(filter_level)
        });

    // Create and register the Bunyan (JSON) formatting layer
    let formatting_layer = BunyanFormattingLayer::new(
        name.into(),
        sink,
    );

    // Compose all layers into a tracing subscriber
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);

    // Set the subscriber as global default
    set_global_default(subscriber).expect("Failed to set tracing subscriber");
    tracing::info!("Tracing initialized with Bunyan formatter");
}

/// Initialize a more readable console logger for development
pub fn init_console_tracing(name: &str) {
    // Skip setting LogTracer if it's already been set
    let _ = LogTracer::init();

    // Get log level from environment or default to DEBUG for our own crate
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            let filter_level = env::var("RUST_LOG")
                .unwrap_or_else(|_| default_filter(name, "debug"));
            EnvFilter::new(filter_level)
        });

    // Create console subscriber with pretty formatting
    let subscriber = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(env_filter)
        .finish();

    // Set the subscriber as global default
    set_global_default(subscriber).expect("Failed to set tracing subscriber");
    tracing::info!("Console tracing initialized");
}

/// Pick the subscriber from `PORTALGATE_LOG_FORMAT`.
/// Bunyan JSON goes to stdout for log shippers; anything else gets the console format.
pub fn init_from_env(name: &str) {
    match env::var(LOG_FORMAT_ENV) {
        Ok(format) if format.trim().eq_ignore_ascii_case("json") => init_tracing(name, std::io::stdout),
        _ => init_console_tracing(name),
    }
}
