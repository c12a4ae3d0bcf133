//! Structured logging setup shared by every binary and long-lived component in the
//! workspace. Components are handed a `Logger` at construction time and derive child
//! loggers with `log.new(o!("component" => "..."))` rather than reaching for a global.

use serdeconv;
use sloggers::{Config, LoggerConfig};

pub use slog::{debug, error, info, o, trace, warn, Logger};

/// Builds a terminal logger at `debug` level writing to stderr. Used when no logging
/// configuration file is supplied (tests, quick scripts, small utility binaries).
pub fn terminal() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("built-in terminal logger config must parse");

    config.build_logger().expect("failed constructing terminal logger")
}

/// Builds a logger from a `sloggers` TOML configuration file, e.g. `lockstep.log.toml`.
pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_file(path).expect("error loading logger configuration file");

    config.build_logger().expect("failed constructing logger from config")
}

/// A logger that discards everything. Handy as a default for library constructors that
/// accept `Into<Option<&Logger>>` and for unit tests that don't care about log output.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
