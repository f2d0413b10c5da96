use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: delayq's own events at `info`,
/// dependencies (redis, mlua) only at `warn`.
pub const DEFAULT_FILTER: &str = "warn,delayq_core=info,delayq=info";

/// Initialize the tracing subscriber for structured logging.
///
/// - Debug builds: pretty-printed human-readable output
/// - Release builds: JSON-formatted output for log aggregation
///
/// Logs go to stderr so queue payloads printed on stdout stay
/// machine-readable. `RUST_LOG` overrides [`DEFAULT_FILTER`].
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if cfg!(debug_assertions) {
        fmt.with_target(true).init();
    } else {
        fmt.json().init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("delayq_core=info"), "got: {rendered}");
        assert!(rendered.contains("warn"), "got: {rendered}");
    }
}
