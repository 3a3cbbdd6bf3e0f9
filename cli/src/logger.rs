use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "rx-demo";

fn colored_level(level: log::Level) -> ColoredString {
    let text = level.to_string();
    match level {
        log::Level::Error => text.bright_red(),
        log::Level::Warn => text.bright_yellow(),
        log::Level::Info => text.bright_green(),
        log::Level::Debug => text.bright_white(),
        log::Level::Trace => text.bright_cyan(),
    }
}

pub fn level_filter(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Console logging, plus a timestamped file in `log_dir` when one is given.
pub fn setup_logging(log_dir: Option<&Path>, log_level: &str) -> Result<()> {
    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]").to_string().truecolor(128, 128, 128),
                record.target(),
                colored_level(record.level()),
                message
            ))
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new().level(level_filter(log_level)).chain(console);

    if let Some(log_dir) = log_dir {
        if !log_dir.exists() {
            fs::create_dir_all(log_dir).with_context(|| format!("creating {}", log_dir.display()))?;
        }
        cleanup_old_logs(log_dir)?;

        let log_file_name = format!("{}-{}.log", APP_NAME, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
        let file = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{}[{}][{}] {}",
                    chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                    record.target(),
                    record.level(),
                    message
                ))
            })
            .chain(fern::log_file(log_dir.join(log_file_name))?);
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}

/// Keeps the newest `rx-demo-*.log` file in `log_dir` and deletes the others.
fn cleanup_old_logs(log_dir: &Path) -> Result<()> {
    let pattern = format!("{}/{}-*.log", log_dir.display(), APP_NAME);
    let mut log_files: Vec<PathBuf> = glob(&pattern)?.filter_map(|entry| entry.ok()).collect();

    // Timestamped names sort chronologically; newest first.
    log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    for old_file in log_files.iter().skip(1) {
        if let Err(e) = fs::remove_file(old_file) {
            eprintln!("Failed to delete old log file {}: {}", old_file.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_defaults_to_info() {
        assert_eq!(level_filter("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(level_filter("whatever"), log::LevelFilter::Info);
    }

    #[test]
    fn test_cleanup_keeps_newest_log() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["2026-01-01_00-00-00", "2026-02-01_00-00-00", "2026-03-01_00-00-00"] {
            fs::write(dir.path().join(format!("{}-{}.log", APP_NAME, stamp)), "x").unwrap();
        }
        fs::write(dir.path().join("other.log"), "x").unwrap();

        cleanup_old_logs(dir.path()).unwrap();

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(left, vec!["other.log".to_string(), format!("{}-2026-03-01_00-00-00.log", APP_NAME)]);
    }
}
