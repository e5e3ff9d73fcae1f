//! Debug-level handling and tracing setup

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Level names accepted by `--debug-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DebugLevel {
    #[value(name = "NotSet")]
    NotSet,
    #[value(name = "Debug")]
    Debug,
    #[value(name = "Info")]
    Info,
    #[value(name = "Warning")]
    Warning,
    #[value(name = "Error")]
    Error,
    #[value(name = "Critical")]
    Critical,
}

impl DebugLevel {
    /// Filter directive, `None` defers to `RUST_LOG`
    pub fn directive(self) -> Option<&'static str> {
        match self {
            DebugLevel::NotSet => None,
            DebugLevel::Debug => Some("debug"),
            DebugLevel::Info => Some("info"),
            DebugLevel::Warning => Some("warn"),
            // tracing has nothing above error
            DebugLevel::Error | DebugLevel::Critical => Some("error"),
        }
    }
}

fn build_filter(level: DebugLevel) -> EnvFilter {
    match level.directive() {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    }
}

/// Install the global subscriber; later calls are ignored.
pub fn init(level: DebugLevel) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_directives() {
        assert_eq!(DebugLevel::NotSet.directive(), None);
        assert_eq!(DebugLevel::Warning.directive(), Some("warn"));
        assert_eq!(DebugLevel::Critical.directive(), Some("error"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init(DebugLevel::Error);
        init(DebugLevel::Debug);
        tracing::debug!("still alive");
    }
}
