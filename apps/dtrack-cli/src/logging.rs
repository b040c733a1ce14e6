//! Log setup. Logs go to stderr so reports on stdout stay machine-readable.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,dtrack_reconcile=info,dtrack_api=info";

/// Filter directive for a `-v` count.
pub fn filter_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_FILTER,
        1 => "info,dtrack_reconcile=debug,dtrack_api=debug",
        _ => "debug,dtrack_reconcile=trace,dtrack_api=trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_verbosity() {
        assert_eq!(filter_for(0), DEFAULT_FILTER);
        assert!(filter_for(1).contains("dtrack_reconcile=debug"));
        assert!(filter_for(5).contains("dtrack_api=trace"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(0);
        init(2);
    }
}
