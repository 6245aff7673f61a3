use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::archive::Compression;
use crate::config::Config;
use crate::plugins::Selection;
use crate::report::ReportOptions;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vmcore-report",
    version,
    about = "Collect diagnostic artifacts from a kernel memory snapshot"
)]
pub struct Cli {
    #[arg(long, required_unless_present = "list_plugins", help = "Path to the vmcore")]
    pub vmcore: Option<PathBuf>,
    #[arg(long, help = "Path to a vmlinux with debug info")]
    pub vmlinux: Option<PathBuf>,
    #[arg(long = "debuginfo-dir", help = "Directory to search for debug info (repeatable)")]
    pub debuginfo_dirs: Vec<PathBuf>,

    #[arg(long, value_delimiter = ',', help = "Alias of --only-plugins")]
    pub plugins: Vec<String>,
    #[arg(short = 'e', long = "enable-plugins", value_delimiter = ',', help = "Enable these plugins")]
    pub enable_plugins: Vec<String>,
    #[arg(short = 'o', long = "only-plugins", value_delimiter = ',', help = "Run only these plugins")]
    pub only_plugins: Vec<String>,
    #[arg(short = 'n', long = "skip-plugins", value_delimiter = ',', help = "Skip these plugins")]
    pub skip_plugins: Vec<String>,
    #[arg(long, help = "Enable experimental plugins")]
    pub experimental: bool,

    #[arg(long, help = "Keep the uncompressed directory instead of an archive")]
    pub build: bool,
    #[arg(long, help = "Label added to the archive name")]
    pub label: Option<String>,
    #[arg(long = "tmp-dir", help = "Directory for the final artifacts")]
    pub tmp_dir: Option<PathBuf>,
    #[arg(long = "compression-type", value_enum)]
    pub compression_type: Option<Compression>,
    #[arg(long, help = "Introspection backend")]
    pub backend: Option<String>,
    #[arg(long, help = "Config file (default: <config dir>/vmcore-report/config.toml)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count, help = "Increase log verbosity")]
    pub verbose: u8,
    #[arg(short, long, help = "Only print errors")]
    pub quiet: bool,
    #[arg(long, help = "Do not rewrite progress lines")]
    pub batch: bool,
    #[arg(long = "list-plugins", help = "List available plugins and exit")]
    pub list_plugins: bool,
}

impl Cli {
    /// Merge flags over the loaded config. Flags win; list values are unioned.
    pub fn report_options(&self, config: &Config) -> ReportOptions {
        let mut skip = config.skip_plugins.clone();
        skip.extend(self.skip_plugins.iter().cloned());
        let mut enable = config.enable_plugins.clone();
        enable.extend(self.enable_plugins.iter().cloned());

        ReportOptions {
            vmcore: self.vmcore.clone().unwrap_or_default(),
            vmlinux: self.vmlinux.clone(),
            debuginfo_dirs: self.debuginfo_dirs.clone(),
            selection: Selection::new(
                self.only_plugins.as_slice(),
                self.plugins.as_slice(),
                skip.as_slice(),
                enable.as_slice(),
                self.experimental || config.experimental,
            ),
            build: self.build,
            label: self.label.clone(),
            tmp_dir: self.tmp_dir.clone().unwrap_or_else(|| config.tmp_dir.clone()),
            compression: self.compression_type.unwrap_or(config.compression),
            hash: config.hash,
            backend: self.backend.clone().unwrap_or_else(|| config.backend.clone()),
        }
    }

    /// Log filter directive: `-v` wins over the config, WARN otherwise.
    pub fn log_directive(&self, config: &Config) -> String {
        match self.verbose {
            0 => config.log_level.clone().unwrap_or_else(|| "warn".to_string()),
            1 => "info".to_string(),
            _ => "debug".to_string(),
        }
    }
}
