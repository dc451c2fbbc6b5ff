use tracing_subscriber::EnvFilter;

/// Initialise logging for an embedding application. The default level is
/// `info`; the settings file can raise it to `debug`, and only then does the
/// `RUST_LOG` environment variable get a say. This keeps a stray environment
/// variable from turning on verbose output for users who never asked for it.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
