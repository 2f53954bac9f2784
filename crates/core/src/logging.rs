//! Centralized logging configuration for the emulator.
//!
//! Per-category, leveled logging with an atomically updated global
//! configuration. Call sites pass a closure so message formatting costs
//! nothing while a category is disabled:
//!
//! ```rust
//! use breadbin_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cpu, LogLevel::Debug, || {
//!     format!("BRK at PC={:04X}", 0x1234)
//! });
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Log level for controlling verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a log level from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// Log category for the different emulator components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Processor execution.
    Cpu,
    /// Bus/memory access.
    Bus,
    /// Video generator (register writes, rendering).
    Video,
    /// Interrupt lines.
    Interrupts,
    /// Unimplemented features/stubs.
    Stubs,
}

const CATEGORY_COUNT: usize = 5;

impl LogCategory {
    fn index(self) -> usize {
        match self {
            LogCategory::Cpu => 0,
            LogCategory::Bus => 1,
            LogCategory::Video => 2,
            LogCategory::Interrupts => 3,
            LogCategory::Stubs => 4,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogCategory::Cpu => "cpu",
            LogCategory::Bus => "bus",
            LogCategory::Video => "video",
            LogCategory::Interrupts => "irq",
            LogCategory::Stubs => "stub",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Some(LogCategory::Cpu),
            "bus" => Some(LogCategory::Bus),
            "video" | "vic" => Some(LogCategory::Video),
            "irq" | "interrupts" => Some(LogCategory::Interrupts),
            "stub" | "stubs" => Some(LogCategory::Stubs),
            _ => None,
        }
    }
}

// Sentinel: category has no override, fall back to the global level.
const UNSET: u8 = 0xFF;

struct LogConfig {
    global: AtomicU8,
    categories: [AtomicU8; CATEGORY_COUNT],
}

static CONFIG: LogConfig = LogConfig {
    global: AtomicU8::new(LogLevel::Warn as u8),
    categories: [
        AtomicU8::new(UNSET),
        AtomicU8::new(UNSET),
        AtomicU8::new(UNSET),
        AtomicU8::new(UNSET),
        AtomicU8::new(UNSET),
    ],
};

/// Set the global log level (categories without an override follow it).
pub fn set_global_level(level: LogLevel) {
    CONFIG.global.store(level as u8, Ordering::Relaxed);
}

/// Override the level of a single category.
pub fn set_category_level(category: LogCategory, level: LogLevel) {
    CONFIG.categories[category.index()].store(level as u8, Ordering::Relaxed);
}

/// Apply a spec string like `"debug"` or `"cpu=trace,video=debug"`.
/// Unknown fragments are reported and skipped.
pub fn apply_spec(spec: &str) {
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((cat, lvl)) => match (LogCategory::parse(cat), LogLevel::from_str(lvl)) {
                (Some(c), Some(l)) => set_category_level(c, l),
                _ => eprintln!("logging: ignoring unrecognized spec fragment '{part}'"),
            },
            None => match LogLevel::from_str(part) {
                Some(l) => set_global_level(l),
                None => eprintln!("logging: ignoring unrecognized spec fragment '{part}'"),
            },
        }
    }
}

/// Whether a message at `level` in `category` would be emitted.
pub fn enabled(category: LogCategory, level: LogLevel) -> bool {
    let cat = CONFIG.categories[category.index()].load(Ordering::Relaxed);
    let effective = if cat == UNSET {
        CONFIG.global.load(Ordering::Relaxed)
    } else {
        cat
    };
    level != LogLevel::Off && level <= LogLevel::from_u8(effective)
}

/// Log a message; the closure only runs when the category/level is enabled.
pub fn log<F: FnOnce() -> String>(category: LogCategory, level: LogLevel, message: F) {
    if enabled(category, level) {
        eprintln!("[{:5}] [{}] {}", level.as_str(), category.as_str(), message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The config is process-global, so tests poke disjoint categories.

    #[test]
    fn default_level_is_warn() {
        assert!(enabled(LogCategory::Bus, LogLevel::Warn));
        assert!(!enabled(LogCategory::Bus, LogLevel::Debug));
    }

    #[test]
    fn category_override_beats_global() {
        set_category_level(LogCategory::Video, LogLevel::Trace);
        assert!(enabled(LogCategory::Video, LogLevel::Trace));
        set_category_level(LogCategory::Video, LogLevel::Off);
        assert!(!enabled(LogCategory::Video, LogLevel::Error));
    }

    #[test]
    fn spec_parsing() {
        apply_spec("stub=debug");
        assert!(enabled(LogCategory::Stubs, LogLevel::Debug));
        assert!(!enabled(LogCategory::Stubs, LogLevel::Trace));
        // Garbage fragments are skipped without touching valid ones.
        apply_spec("nonsense=wat");
        assert!(enabled(LogCategory::Stubs, LogLevel::Debug));
    }

    #[test]
    fn level_parsing_accepts_numbers_and_names() {
        assert_eq!(LogLevel::from_str("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("2"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("bogus"), None);
    }
}
