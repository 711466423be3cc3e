//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! The primary line for a request is its identity: the image identifier and
//! the IIIF transformation tail. What the engine produced (dimensions, content
//! type, size, destination) follows as indented context lines.
//!
//! # Output Format
//!
//! ## Transform
//!
//! ```text
//! cat.jpg full/max/0/default.png
//!     Engine: software
//!     Result: 300 x 200 image/png (14.2 KB)
//!     Output: out/cat.png
//! ```
//!
//! ## Info
//!
//! ```text
//! cat.jpg
//!     Size: 300 x 200
//!     Id: http://localhost:8080/cat.jpg
//!     Compliance: http://iiif.io/api/image/2/level2.json
//!     Formats: jpg png gif webp tif
//!     Qualities: default color gray bitonal dither
//! ```
//!
//! ## Batch
//!
//! ```text
//! 001 cat.jpg full/max/0/default.png
//!     Result: 300 x 200 image/png (14.2 KB)
//! 002 dog.png 400,0,10,10/max/0/default.png
//!     Error: Invalid region: '400,0,10,10' lies outside a 300 x 200 image
//!
//! Transformed 1 image, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::imaging::{Dimensions, EngineKind};
use crate::profile::{Profile, ProfileEntry};
use std::path::PathBuf;

/// What one successful transformation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformReport {
    pub identifier: String,
    pub request: String,
    pub engine: EngineKind,
    pub dimensions: Dimensions,
    pub content_type: String,
    pub bytes: usize,
    pub animated: bool,
    pub output: Option<PathBuf>,
}

/// One line of a batch file, after it ran.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Done(TransformReport),
    Failed { request: String, error: String },
}

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count: `512 B`, `14.2 KB`, `3.1 MB`.
fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn result_line(report: &TransformReport) -> String {
    let animated = if report.animated { ", animated" } else { "" };
    format!(
        "{}Result: {} {} ({}{})",
        indent(1),
        report.dimensions,
        report.content_type,
        format_bytes(report.bytes),
        animated
    )
}

// ============================================================================
// transform
// ============================================================================

pub fn format_transform_output(report: &TransformReport) -> Vec<String> {
    let mut lines = vec![
        format!("{} {}", report.identifier, report.request),
        format!("{}Engine: {}", indent(1), report.engine),
        result_line(report),
    ];
    if let Some(path) = &report.output {
        lines.push(format!("{}Output: {}", indent(1), path.display()));
    }
    lines
}

pub fn print_transform_output(report: &TransformReport) {
    for line in format_transform_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// info
// ============================================================================

pub fn format_info_output(identifier: &str, profile: &Profile) -> Vec<String> {
    let mut lines = vec![
        identifier.to_string(),
        format!(
            "{}Size: {}",
            indent(1),
            Dimensions::new(profile.width, profile.height)
        ),
        format!("{}Id: {}", indent(1), profile.id),
    ];
    for entry in &profile.profile {
        match entry {
            ProfileEntry::Uri(uri) => lines.push(format!("{}Compliance: {}", indent(1), uri)),
            ProfileEntry::Level(level) => {
                lines.push(format!("{}Formats: {}", indent(1), level.formats.join(" ")));
                lines.push(format!(
                    "{}Qualities: {}",
                    indent(1),
                    level.qualities.join(" ")
                ));
            }
        }
    }
    lines
}

pub fn print_info_output(identifier: &str, profile: &Profile) {
    for line in format_info_output(identifier, profile) {
        println!("{}", line);
    }
}

// ============================================================================
// batch
// ============================================================================

/// Format batch results in input order, followed by a summary line.
pub fn format_batch_output(outcomes: &[BatchOutcome]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut failed = 0;

    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            BatchOutcome::Done(report) => {
                lines.push(format!(
                    "{} {} {}",
                    format_index(i + 1),
                    report.identifier,
                    report.request
                ));
                lines.push(result_line(report));
                if let Some(path) = &report.output {
                    lines.push(format!("{}Output: {}", indent(1), path.display()));
                }
            }
            BatchOutcome::Failed { request, error } => {
                failed += 1;
                lines.push(format!("{} {}", format_index(i + 1), request));
                lines.push(format!("{}Error: {}", indent(1), error));
            }
        }
    }

    let done = outcomes.len() - failed;
    lines.push(String::new());
    if failed == 0 {
        lines.push(format!("Transformed {}", plural(done, "image")));
    } else {
        lines.push(format!(
            "Transformed {}, {} failed",
            plural(done, "image"),
            failed
        ));
    }
    lines
}

pub fn print_batch_output(outcomes: &[BatchOutcome]) {
    for line in format_batch_output(outcomes) {
        println!("{}", line);
    }
}
