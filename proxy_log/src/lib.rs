use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log severity, ordered `Trace < Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn from_str(s: &str) -> Option<Level> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }
}

static ACTIVE_LEVEL: OnceLock<Level> = OnceLock::new();

/// Reads `COBRA_LOG_LEVEL` once and caches it; an unrecognized value
/// is silently treated as `info` here (the CLI validates it up front and
/// exits 1 on a bad value before this is ever consulted for real work).
pub fn active_level() -> Level {
    *ACTIVE_LEVEL.get_or_init(|| {
        std::env::var("COBRA_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::from_str(&s))
            .unwrap_or(Level::Info)
    })
}

/// Validates a raw env value, for the CLI to report a bad level as a
/// configuration error instead of silently falling back.
pub fn parse_level(raw: &str) -> Result<Level, String> {
    Level::from_str(raw).ok_or_else(|| raw.to_string())
}

#[doc(hidden)]
pub fn enabled(level: Level) -> bool {
    level >= active_level()
}

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = duration.as_secs();

    let year = 1970 + (secs / 31_557_600); // Rough years
    let month = ((secs % 31_557_600) / 2_628_000) as u8 + 1;
    let day = ((secs % 2_628_000) / 86_400) as u8 + 1;
    let hour = ((secs % 86_400) / 3600) as u8;
    let minute = ((secs % 3600) / 60) as u8;
    let second = (secs % 60) as u8;

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

#[macro_export]
macro_rules! log {
    ($level_enum:expr, $level:expr, $color:expr, $($arg:tt)*) => {
        if $crate::enabled($level_enum) {
            let ts = $crate::format_time(std::time::SystemTime::now());
            println!(
                "[{}] \x1b[30m #|| server_proxy ||# \x1b[0m \x1b[{}m{}\x1b[0m: {}",
                ts,
                $color,
                $level,
                format!($($arg)*)
            );
        }
    };
}

#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::log!($crate::Level::Info, "INFO ", "32", $($arg)*); }; } // Green
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::log!($crate::Level::Warn, "WARN ", "33", $($arg)*); }; } // Yellow
#[macro_export]
macro_rules! error { ($($arg:tt)*) => { $crate::log!($crate::Level::Error, "ERROR", "31", $($arg)*); }; } // Red
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::log!($crate::Level::Debug, "DEBUG", "36", $($arg)*); }; } // Cyan
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::log!($crate::Level::Trace, "TRACE", "34", $($arg)*); }; } // Blue
