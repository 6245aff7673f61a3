//! Utility modules

pub mod panics;
pub mod paths;
pub mod ui;

pub use paths::{archive_name, config_path, sanitize_label, LOG_FILE_NAME};
pub use panics::{install_panic_hook, isolate};
pub use ui::Ui;
