//! Tracing subscriber setup for the `fithero` binary.

use crate::config::{LogConfig, LogFormat};
use crate::error::ClientError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_DIRECTIVES: &str = "fithero_sync=debug,fithero_client=debug,info";

/// Directives used when `RUST_LOG` is unset.
pub fn filter_directives(config: &LogConfig, verbose: bool) -> &str {
    if verbose {
        VERBOSE_DIRECTIVES
    } else {
        config.filter.as_str()
    }
}

/// Install the global subscriber. Events go to stderr so command output on
/// stdout stays clean.
pub fn init(config: &LogConfig, verbose: bool) -> Result<(), ClientError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config, verbose))
            .map_err(|e| ClientError::Logging(e.to_string()))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| ClientError::Logging(e.to_string()))
}
