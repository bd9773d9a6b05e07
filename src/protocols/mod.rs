//! Protocol implementations.
//!
//! Each protocol exposes a `handle_connection` entry point that the
//! acceptance loop calls from a freshly spawned task:
//! - `echo`: newline-delimited text echo with `time` and `quit` commands
//! - `http`: HTTP/1.1 with a fixed route table of generated HTML pages

pub mod echo;
pub mod http;

use chrono::Local;
use std::fmt;

/// Timestamp format shared by both services.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Protocol served by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Echo,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Echo => f.write_str("tcp-echo"),
            Protocol::Http => f.write_str("http"),
        }
    }
}

/// Current server local time, formatted as `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
