//! Logging setup
//!
//! The crate logs through the `log` facade only. Applications pick the backend;
//! these helpers install `env_logger` for the common case.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize logging from `RUST_LOG`, defaulting to `info`
pub fn init() {
    init_with_level(LevelFilter::Info);
}

/// Initialize logging with a default level that `RUST_LOG` can still override
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Parse a level name as written in configuration files ("warn", "debug", ...)
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" WARN "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_with_level(LevelFilter::Trace);
        init();
    }
}
