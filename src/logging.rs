use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

use crate::error::{HarvestError, Result};

/// File picked up from the working directory when present
pub const DEFAULT_LOG_CONFIG: &str = "log4rs.yml";

const CONSOLE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {m}{n}";

/// Install the global logger.
///
/// See [`build_config`] for how `path` and `level` are combined.
pub fn init(path: Option<&Path>, level: Option<LevelFilter>) -> Result<()> {
    log4rs::init_config(build_config(path, level)?)
        .map(|_| ())
        .map_err(|e| HarvestError::Logging(e.to_string()))
}

/// Uses the log4rs file at `path` (or [`DEFAULT_LOG_CONFIG`]) if it exists,
/// otherwise a console appender. `level` overrides the root level either
/// way; the console falls back to `Info`.
pub fn build_config(path: Option<&Path>, level: Option<LevelFilter>) -> Result<Config> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_LOG_CONFIG));
    if file.exists() {
        let mut config = log4rs::config::load_config_file(file, Default::default())
            .map_err(|e| HarvestError::Logging(format!("{}: {}", file.display(), e)))?;
        if let Some(level) = level {
            config.root_mut().set_level(level);
        }
        return Ok(config);
    }
    if path.is_some() {
        return Err(HarvestError::Logging(format!(
            "log configuration {} not found",
            file.display()
        )));
    }

    console_config(level.unwrap_or(LevelFilter::Info))
}

fn console_config(level: LevelFilter) -> Result<Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| HarvestError::Logging(e.to_string()))
}
