//! Logger initialization.
//!
//! The crate logs through the `log` facade; consumers embed it under their
//! own subscriber, or call [`init_logger`] for a sensible default.

use log::LevelFilter;

/// Initializes `env_logger` with the given level.
///
/// Reads `RUST_LOG` first, then overrides with `level` so callers keep
/// explicit control. Noisy dependency modules are filtered down.
///
/// Returns an error if a global logger is already installed.
pub fn init_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("html5ever", LevelFilter::Error);
    builder.filter_module("sqlx", LevelFilter::Info);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("selectors", LevelFilter::Warn);
    // hickory warns on malformed UDP DNS messages it already handles.
    builder.filter_module("hickory_proto", LevelFilter::Error);
    builder.filter_module("site_audit", level);
    builder.try_init()
}
