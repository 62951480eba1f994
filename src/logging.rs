//! Host logger behind the [`log`] facade.
//!
//! The outer shell decides where records go; the core only needs the
//! facade macros. This module supplies a plain stderr logger with colored
//! levels for hosts that have nothing better.

use anstyle::AnsiColor;
use log::{Level, LevelFilter, Metadata, Record};

/// Minimal stderr logger with per-level color.
struct HostLogger;

static LOGGER: HostLogger = HostLogger;

/// Install the stderr logger at the given level.
///
/// Errors if another logger has been installed already.
pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
	log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

impl log::Log for HostLogger {
	fn enabled(&self, metadata: &Metadata<'_>) -> bool {
		metadata.level() <= log::max_level()
	}

	fn log(&self, record: &Record<'_>) {
		if !self.enabled(record.metadata()) {
			return;
		}

		let color = match record.level() {
			Level::Error => AnsiColor::Red,
			Level::Warn => AnsiColor::Yellow,
			Level::Info => AnsiColor::Green,
			Level::Debug => AnsiColor::Cyan,
			Level::Trace => AnsiColor::BrightBlack,
		};
		let style = anstyle::Style::new().fg_color(Some(color.into()));

		eprintln!(
			"[{}{}{}] {}",
			style.render(),
			record.level(),
			style.render_reset(),
			record.args()
		);
	}

	fn flush(&self) {}
}
