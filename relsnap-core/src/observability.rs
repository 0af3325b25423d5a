/*!
Logging setup for relsnap processes.

Library code only emits `tracing` events; binaries call [`init_tracing`] once
at startup to install a subscriber.
*/

use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::{Result, SnapshotError};

/// Filter used when `RUST_LOG` is not set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "relsnap=debug,relsnap_core=debug"
    } else {
        "relsnap=info,relsnap_core=info"
    }
}

/// Install the global tracing subscriber
///
/// # Arguments
/// * `verbose` - Lower the default level to `debug`
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// # Errors
/// Fails if the `RUST_LOG` filter cannot be parsed or a global subscriber is
/// already installed.
pub fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(default_directive(verbose)),
    }
    .map_err(|e| SnapshotError::validation(format!("Invalid log filter: {e}")))?;

    let installed = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(Registry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        set_global_default(Registry::default().with(filter).with(fmt_layer))
    };

    installed.map_err(|e| {
        SnapshotError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })
}
