//! Tracing subscriber setup for binaries embedding the queue.
//!
//! Human-readable output by default, JSON when `LOG_FORMAT=json`. `RUST_LOG`
//! directives are honored on top of the default directive.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter directive for this crate.
pub const DEFAULT_DIRECTIVE: &str = "redwork_queue=info";

/// Whether the given `LOG_FORMAT` value asks for JSON output.
fn wants_json(log_format: Option<&str>) -> bool {
    log_format.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}

/// Build the env filter from `RUST_LOG`, adding `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(default_directive: &str) {
    let use_json = wants_json(std::env::var("LOG_FORMAT").ok().as_deref());
    let filter = env_filter(default_directive);

    let result = if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(filter)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
