//! HTTP protocol implementation.
//!
//! Serves a fixed set of generated HTML pages over HTTP/1.1:
//!
//! ```text
//! GET /       -> 200 menu linking to the other pages
//! GET /time   -> 200 current server time
//! GET /hello  -> 200 greeting
//! GET /echo   -> 200 placeholder page
//! GET /other  -> 404 not found page
//! ```
//!
//! Paths are matched case-insensitively and exactly; the method and the
//! query string are ignored. Every response is `text/html; charset=utf-8`
//! with an explicit `Content-Length`.

pub mod handler;
pub mod pages;
pub mod routes;

pub use handler::handle_connection;
