// Copyright 2022 Oxide Computer Company

//! Stderr diagnostics.
//!
//! The original writes recoverable faults and logged-but-ignored conditions
//! (duplicate insert, overwritten pid, file open failure) straight to
//! `stderr` with `fprintf`/`std::cerr`; there is no structured error
//! channel beyond that (spec §6/§7). This module keeps the same texture,
//! using `colored` the way the teacher's `p4::error` module does for its
//! own diagnostics.

use colored::Colorize;
use std::fmt::Display;
use std::path::Path;

pub fn warn(msg: impl Display) {
    eprintln!("{}: {}", "warning".yellow().bold(), msg);
}

pub fn report_io_error(path: &Path, err: &std::io::Error) {
    eprintln!(
        "{}: failed to open {}: {}",
        "error".bright_red().bold(),
        path.display(),
        err
    );
}

pub fn report_overwrite(id: u32, previous: u32) {
    warn(format!("ID {} overwrites {}", id, previous));
}
