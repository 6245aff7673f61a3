//! Operator-facing console output, separate from the log file.

use std::io::{self, Write};

const PROGRESS_WIDTH: usize = 90;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ui {
    pub quiet: bool,
    pub batch: bool,
    pub verbosity: u8,
}

impl Ui {
    pub fn new(quiet: bool, batch: bool, verbosity: u8) -> Self {
        Self {
            quiet,
            batch,
            verbosity,
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", msg.as_ref());
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("WARNING: {}", msg.as_ref());
        }
    }

    /// Errors are printed even in quiet mode.
    pub fn error(&self, msg: impl AsRef<str>) {
        eprintln!("{}", msg.as_ref());
    }

    fn rewrites(&self) -> bool {
        !self.batch && self.verbosity == 0
    }

    /// One progress line; rewritten in place on interactive runs.
    pub fn progress(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        if self.rewrites() {
            let mut out = io::stdout().lock();
            let _ = write!(out, "\r{:<width$}", msg.as_ref(), width = PROGRESS_WIDTH);
            let _ = out.flush();
        } else {
            println!("{}", msg.as_ref());
        }
    }

    /// Terminate an in-place progress line.
    pub fn finish_progress(&self) {
        if !self.quiet && self.rewrites() {
            println!();
        }
    }
}
