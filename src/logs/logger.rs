use chrono::Local;
use env_logger::{Builder, Env};
use log::Level;
use std::env;
use std::io::Write;

// Visible width of the level column including the brackets.
const LEVEL_FIELD_WIDTH: usize = 8;

fn level_color(level: Level, text: &str) -> String {
    let code = match level {
        Level::Error => "31",
        Level::Warn => "33",
        Level::Info => "32",
        Level::Debug => "34",
        Level::Trace => "35",
    };
    format!("\x1b[{}m{}\x1b[0m", code, text)
}

/// Initializes the global logger with an aligned, optionally colored format:
///
/// ```text
/// Aug 01 26 09:14:03 PM | [INFO]  | janus_rs::services::http | forwarding request
/// ```
///
/// The filter defaults to `info` and honors `RUST_LOG`; colors are disabled
/// when `NO_COLOR` is set.
pub fn configure_logger() {
    let no_color = env::var("NO_COLOR").is_ok();

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            let level = record.level();
            let plain = format!("[{}]", level);
            let padding = LEVEL_FIELD_WIDTH.saturating_sub(plain.len()).max(1);

            let level_display = if no_color {
                plain
            } else {
                level_color(level, &plain)
            };

            writeln!(
                buf,
                "{} | {}{}| {} | {}",
                Local::now().format("%b %d %y %I:%M:%S %p"),
                level_display,
                " ".repeat(padding),
                record.target(),
                record.args(),
            )
        })
        .init();
}
