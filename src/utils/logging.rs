use std::env;

/// Initialize tracing on stderr, filtered by `RUST_LOG` (default `info`).
///
/// stdout is left to the outcome lines the binaries print.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string())
                .as_str(),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
