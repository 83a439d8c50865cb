use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "mercados=info";
const VERBOSE_DIRECTIVE: &str = "mercados=debug";

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// the JSON payload. `RUST_LOG` overrides the default directive.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_DIRECTIVE
    } else {
        DEFAULT_DIRECTIVE
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second initialisation only happens in tests; keep the first.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
