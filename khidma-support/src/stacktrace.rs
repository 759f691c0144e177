//! Source-location capture for service registrations.
//!
//! A [`Frame`] is the only thing the rest of Khidma knows about a call
//! stack. The registration site comes from `#[track_caller]`, which is
//! always available; the surrounding stack comes from
//! [`std::backtrace::Backtrace`] and is empty unless backtraces are enabled
//! through `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE`.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;

use serde::Serialize;

/// Maximum number of ancestor frames kept per capture.
pub const MAX_STACK_DEPTH: usize = 32;

/// One captured source location.
///
/// # Examples
/// ```
/// use khidma_support::stacktrace::Frame;
///
/// let frame = Frame::caller();
/// assert!(frame.file.ends_with(".rs"));
/// assert!(frame.line > 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Symbol name, when the frame was read from a backtrace.
    pub function: Option<String>,
}

impl Frame {
    /// Returns the location of the outermost `#[track_caller]` call site.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
            function: None,
        }
    }

    /// Returns `true` for the zero-value frame.
    pub fn is_empty(&self) -> bool {
        self.file.is_empty() && self.line == 0 && self.function.is_none()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, self.file.is_empty()) {
            (Some(function), false) => {
                write!(f, "{function} ({}:{}:{})", self.file, self.line, self.column)
            }
            (Some(function), true) => write!(f, "{function}"),
            (None, _) => write!(f, "{}:{}:{}", self.file, self.line, self.column),
        }
    }
}

/// Captures the current call stack, innermost frame first.
///
/// Frames belonging to the backtrace machinery itself are dropped. Returns
/// an empty vector when backtraces are disabled for this process.
pub fn capture_stack() -> Vec<Frame> {
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_backtrace(&backtrace.to_string())
}

/// Parses the textual form of a [`Backtrace`] into frames.
///
/// The format is the one produced by the standard library:
///
/// ```text
///    0: my_app::register
///              at ./src/main.rs:10:5
///    1: my_app::main
///              at ./src/main.rs:20:9
/// ```
///
/// Symbols without an `at` line keep an empty file.
pub fn parse_backtrace(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    // Whether the most recent symbol line produced a frame still missing its location.
    let mut awaiting_location = false;

    for line in text.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if awaiting_location {
                if let Some(frame) = frames.last_mut() {
                    let (file, line, column) = split_location(location);
                    frame.file = file;
                    frame.line = line;
                    frame.column = column;
                }
                awaiting_location = false;
            }
            continue;
        }

        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        awaiting_location = false;
        if is_capture_machinery(symbol) {
            continue;
        }
        if frames.len() == MAX_STACK_DEPTH {
            break;
        }
        frames.push(Frame {
            function: Some(symbol.to_string()),
            ..Frame::default()
        });
        awaiting_location = true;
    }

    frames
}

fn is_capture_machinery(symbol: &str) -> bool {
    symbol.starts_with("std::backtrace")
        || symbol.starts_with("std::backtrace_rs")
        || symbol.contains("stacktrace::capture_stack")
}

// "./src/main.rs:10:5"; the file part may itself contain ':' on Windows.
fn split_location(location: &str) -> (String, u32, u32) {
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next().and_then(|c| c.parse().ok());
    let line = parts.next().and_then(|l| l.parse().ok());
    match (parts.next(), line, column) {
        (Some(file), Some(line), Some(column)) => (file.to_string(), line, column),
        _ => (location.to_string(), 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/abc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: std::backtrace::Backtrace::create
             at /rustc/abc/library/std/src/backtrace.rs:331:13
   2: khidma_support::stacktrace::capture_stack
             at ./khidma-support/src/stacktrace.rs:70:21
   3: my_app::register_database
             at ./src/main.rs:10:5
   4: my_app::main
             at ./src/main.rs:20:9
   5: core::ops::function::FnOnce::call_once
";

    #[test]
    fn caller_points_at_this_file() {
        let frame = Frame::caller();
        assert!(frame.file.ends_with("stacktrace.rs"));
        assert!(frame.line > 0);
        assert!(!frame.is_empty());
    }

    #[test]
    fn default_frame_is_empty() {
        assert!(Frame::default().is_empty());
    }

    #[test]
    fn parse_skips_capture_frames() {
        let frames = parse_backtrace(SAMPLE);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].function.as_deref(), Some("my_app::register_database"));
        assert_eq!(frames[0].file, "./src/main.rs");
        assert_eq!(frames[0].line, 10);
        assert_eq!(frames[0].column, 5);
        assert_eq!(frames[1].line, 20);
    }

    #[test]
    fn parse_keeps_symbol_without_location() {
        let frames = parse_backtrace(SAMPLE);
        let last = frames.last().unwrap();
        assert_eq!(last.function.as_deref(), Some("core::ops::function::FnOnce::call_once"));
        assert!(last.file.is_empty());
        assert_eq!(last.to_string(), "core::ops::function::FnOnce::call_once");
    }

    #[test]
    fn parse_respects_depth_limit() {
        let text: String = (0..MAX_STACK_DEPTH + 10)
            .map(|i| format!("  {i}: app::f{i}\n      at ./src/lib.rs:{i}:1\n"))
            .collect();
        assert_eq!(parse_backtrace(&text).len(), MAX_STACK_DEPTH);
    }

    #[test]
    fn windows_paths_split_from_the_right() {
        let (file, line, column) = split_location(r"C:\app\src\main.rs:12:3");
        assert_eq!(file, r"C:\app\src\main.rs");
        assert_eq!(line, 12);
        assert_eq!(column, 3);
    }

    #[test]
    fn frame_display() {
        let frame = Frame {
            file: "src/main.rs".into(),
            line: 4,
            column: 2,
            function: None,
        };
        assert_eq!(frame.to_string(), "src/main.rs:4:2");
    }
}
