//! Route table mapping request paths to page generators.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::pages;

/// Produces the HTML body for a route.
pub type PageFn = fn() -> String;

/// Routes served by every HTTP server in the process.
pub static ROUTES: LazyLock<RouteTable> = LazyLock::new(RouteTable::standard);

/// Immutable path to page mapping. Paths are stored lower-cased and
/// looked up with exact, case-insensitive matching.
#[derive(Debug)]
pub struct RouteTable {
    routes: HashMap<String, PageFn>,
}

impl RouteTable {
    /// Build a table from `(path, page)` pairs.
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, PageFn)>) -> Self {
        let routes = entries
            .into_iter()
            .map(|(path, page)| (path.to_lowercase(), page))
            .collect();
        Self { routes }
    }

    /// The menu, time, greeting and echo placeholder pages.
    pub fn standard() -> Self {
        Self::new([
            ("/", pages::menu as PageFn),
            ("/time", pages::time as PageFn),
            ("/hello", pages::hello as PageFn),
            ("/echo", pages::echo as PageFn),
        ])
    }

    /// Find the page for `path`.
    pub fn lookup(&self, path: &str) -> Option<PageFn> {
        self.routes.get(&path.to_lowercase()).copied()
    }
}
