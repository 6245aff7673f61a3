//! Path and naming helpers

use std::path::PathBuf;

use chrono::{DateTime, Local};
use rand::distr::Alphanumeric;
use rand::Rng;

pub const APP_NAME: &str = "vmcore-report";

/// Log file name in the working directory and under `sos_logs/`.
pub const LOG_FILE_NAME: &str = "vmcore-report.log";

/// Default config file path (`<config_dir>/vmcore-report/config.toml`)
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{APP_NAME}")))
        .join("config.toml")
}

/// Keep only `[A-Za-z0-9_-]`.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase())
        .take(len)
        .collect()
}

/// `vmcore-report[-<label>]-<YYYY-MM-DD>-<5 random lowercase>`
pub fn archive_name(label: Option<&str>, now: DateTime<Local>) -> String {
    let mut name = APP_NAME.to_string();
    if let Some(label) = label.map(sanitize_label).filter(|l| !l.is_empty()) {
        name.push('-');
        name.push_str(&label);
    }
    format!("{name}-{}-{}", now.format("%Y-%m-%d"), random_suffix(5))
}
