//! Echo protocol implementation.
//!
//! A line-oriented text service. Every line the client sends is answered
//! with exactly one line:
//!
//! ```text
//! Request:  hello\n
//! Response: Эхо: hello\n
//!
//! Request:  TIME\n
//! Response: Текущее время: 2025-01-31 12:00:00\n
//!
//! Request:  quit\n
//! Response: До свидания!\n   (server then closes the connection)
//! ```
//!
//! Commands are matched case-insensitively after trimming surrounding
//! whitespace. Anything that is not a command, including an empty line, is
//! echoed back trimmed.

pub mod handler;
pub mod parser;

pub use handler::handle_connection;
