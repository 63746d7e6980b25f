use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "digitization=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("DIGITIZE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Progress logging goes to stderr so `--json` output on stdout stays clean.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("digitization=debug")
    } else {
        env_filter()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
