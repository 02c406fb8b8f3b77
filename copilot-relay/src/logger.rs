//! Logger initialization for the relay binary.

use jiff::{Zoned, tz::TimeZone};
use logforth::{append::Stderr, filter::EnvFilter, layout::Layout};
use std::{io::IsTerminal, str::FromStr, sync::Once};

static INIT: Once = Once::new();

/// Single-line stderr layout: UTC timestamp, padded level, message.
///
/// Level colors are only applied when stderr is a terminal.
#[derive(Debug)]
struct RelayLayout {
    colored: bool,
}

impl RelayLayout {
    fn for_stderr() -> Self {
        Self {
            colored: std::io::stderr().is_terminal(),
        }
    }

    fn level_tag(&self, level: log::Level) -> String {
        if !self.colored {
            return format!("{level:>5}");
        }

        let color = match level {
            log::Level::Error => "31",
            log::Level::Warn => "33",
            log::Level::Info => "32",
            log::Level::Debug => "34",
            log::Level::Trace => "35",
        };

        format!("\x1b[{color}m{level:>5}\x1b[0m")
    }
}

impl Layout for RelayLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let timestamp = Zoned::now()
            .with_time_zone(TimeZone::UTC)
            .strftime("%Y-%m-%dT%H:%M:%S%.6fZ");

        let line = format!("{timestamp} {}  {}", self.level_tag(record.level()), record.args());

        Ok(line.into_bytes())
    }
}

/// Initialize the stderr logger.
///
/// The filter should be a string like `info` or `gateway=debug,config=warn`.
pub fn init(filter: &str) {
    let filter = filter.to_owned();

    INIT.call_once(move || {
        logforth::builder()
            .dispatch(move |d| {
                let filter = EnvFilter::from_str(&filter)
                    .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

                d.filter(filter).append(Stderr::default().with_layout(RelayLayout::for_stderr()))
            })
            .apply();
    });
}
