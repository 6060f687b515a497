//! Console logging for the CLI.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "warn,fuzz_driver_synth=info,fuzz_driver_core=info,fuzz_driver_llm=info";
const VERBOSE_FILTER: &str =
    "info,fuzz_driver_synth=debug,fuzz_driver_core=debug,fuzz_driver_llm=debug";

/// Default directives when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `verbose`.
/// Calling this twice is harmless.
pub fn init_logging(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
