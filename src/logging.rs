//! Diagnostic logging setup.
//!
//! The reporter logs through `tracing`. Hosts that already install a
//! subscriber keep theirs; [`init_logging`] is for the CLI and for hosts
//! that have none.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Directive used when `RUST_LOG` is not set.
fn default_directive(debug: bool) -> &'static str {
    if debug {
        "info,qase_reporter=debug"
    } else {
        "info"
    }
}

/// Builds the filter: `RUST_LOG` if set, otherwise the default directive.
pub fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

/// Installs a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already set, which is not an
/// error for an embedded reporter.
pub fn init_logging(debug: bool) -> bool {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(debug))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
