//! Diagnostic tracing for the `kiln` binary.
//!
//! Library crates only emit events; this module installs the subscriber.
//! Command output goes to stdout and is never routed through tracing.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `warn`, raised to `debug`
/// by `--verbose` and lowered to `error` by `--quiet`.
///
/// ```bash
/// RUST_LOG=kiln_exec=debug kiln run graph.json --exec ./generate.sh
/// ```
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    // Keeps a subscriber that is already installed.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_selects_level() {
        assert_eq!(default_directive(false, false), "warn");
        assert_eq!(default_directive(true, false), "debug");
        assert_eq!(default_directive(false, true), "error");
        assert_eq!(default_directive(true, true), "debug");
    }
}
