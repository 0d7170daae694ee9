use tracing_subscriber::{fmt, EnvFilter};

/// Log to stderr so `--cmd --json` output on stdout stays machine-readable.
/// `RUST_LOG` selects levels (default `warn`); `MONAD_WALLET_LOG_JSON=1` switches to JSON lines.
pub(crate) fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let use_json = std::env::var("MONAD_WALLET_LOG_JSON")
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
