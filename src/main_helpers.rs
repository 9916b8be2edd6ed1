use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_LEVEL: &str = "warn";
const VERBOSE_LOG_LEVEL: &str = "debug";

/// Install the stderr subscriber. `RUST_LOG` wins over `--verbose`.
pub(crate) fn initialize_tracing(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_LOG_LEVEL
    } else {
        DEFAULT_LOG_LEVEL
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose),
        )
        .try_init();

    if let Err(err) = result {
        tracing::warn!(error = %err, "tracing subscriber already installed");
    }
}
